use sqlx::PgExecutor;
use time::OffsetDateTime;

use crate::Result;

/// Records a notification id. Returns `false` when it was already present.
pub async fn record_if_new<'e, E>(
	executor: E,
	notification_id: &str,
	received_at: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO notification_ledger (notification_id, received_at)
VALUES ($1, $2)
ON CONFLICT (notification_id) DO NOTHING",
	)
	.bind(notification_id)
	.bind(received_at)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn purge_older_than<'e, E>(executor: E, cutoff: OffsetDateTime) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM notification_ledger WHERE received_at < $1")
		.bind(cutoff)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}
