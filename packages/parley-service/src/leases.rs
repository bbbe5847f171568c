use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::{ParleyService, Result};
use parley_storage::sync_state;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeaseRenewalReport {
	pub renewed: u32,
	pub failed: u32,
	pub total: u32,
}

impl ParleyService {
	/// Reissues the push subscription of every mailbox whose lease ends inside the renewal window.
	/// Each mailbox succeeds or fails on its own.
	pub async fn renew_due_leases(&self, now: OffsetDateTime) -> Result<LeaseRenewalReport> {
		let window_end = now + Duration::hours(self.cfg.watch.renewal_window_hours);
		let due = sync_state::due_leases(&self.db.pool, window_end).await?;
		let topic = self.cfg.providers.mail.topic_name.as_str();
		let mut report = LeaseRenewalReport { total: due.len() as u32, ..Default::default() };

		for candidate in &due {
			let lease = match self.providers.mail.subscribe(&candidate.access_token, topic).await {
				Ok(lease) => lease,
				Err(err) => {
					report.failed += 1;

					tracing::warn!(
						mailbox_id = %candidate.mailbox_id,
						error = %err,
						"Push subscription renewal failed."
					);

					continue;
				},
			};

			let recorded = sync_state::record_lease(
				&self.db.pool,
				candidate,
				lease.lease_expires_at,
				&lease.cursor,
				now,
			)
			.await;

			match recorded {
				Ok(true) => report.renewed += 1,
				Ok(false) => {
					report.failed += 1;

					tracing::warn!(
						mailbox_id = %candidate.mailbox_id,
						"Renewed lease does not extend the stored expiry."
					);
				},
				Err(err) => {
					report.failed += 1;

					tracing::warn!(
						mailbox_id = %candidate.mailbox_id,
						error = %err,
						"Failed to store renewed lease."
					);
				},
			}
		}

		tracing::info!(
			renewed = report.renewed,
			failed = report.failed,
			total = report.total,
			"Lease renewal sweep finished."
		);

		Ok(report)
	}
}
