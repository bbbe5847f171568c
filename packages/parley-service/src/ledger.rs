use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::{ParleyService, Result};
use parley_storage::{ledger, outbox};

/// Finished extraction jobs are kept this long for inspection.
const OUTBOX_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
	pub deleted: u64,
}

impl ParleyService {
	/// Drops ledger entries older than the provider's redelivery window.
	pub async fn purge_notifications(&self, now: OffsetDateTime) -> Result<PurgeReport> {
		let cutoff = now - Duration::hours(self.cfg.ledger.retention_hours);
		let deleted = ledger::purge_older_than(&self.db.pool, cutoff).await?;

		tracing::info!(deleted, "Notification ledger purged.");

		Ok(PurgeReport { deleted })
	}

	pub async fn purge_finished_extractions(&self, now: OffsetDateTime) -> Result<PurgeReport> {
		let cutoff = now - Duration::days(OUTBOX_RETENTION_DAYS);
		let deleted = outbox::purge_finished(&self.db.pool, cutoff).await?;

		Ok(PurgeReport { deleted })
	}
}
