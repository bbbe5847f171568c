use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::ExtractionJob};

/// Queues extraction for a received message. A message is queued at most once.
pub async fn enqueue_extraction<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	message_id: &str,
	thread_id: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO extraction_outbox (
	outbox_id,
	mailbox_id,
	message_id,
	thread_id,
	status,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)
ON CONFLICT (mailbox_id, message_id) DO NOTHING",
	)
	.bind(Uuid::new_v4())
	.bind(mailbox_id)
	.bind(message_id)
	.bind(thread_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Claims the oldest available job and hides it from other workers until the lease runs out. A
/// CLAIMED job whose lease expired is claimable again.
pub async fn claim_next_extraction(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<ExtractionJob>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, ExtractionJob>(
		"\
SELECT
	outbox_id,
	mailbox_id,
	message_id,
	thread_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM extraction_outbox
WHERE status IN ('PENDING', 'FAILED', 'CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let Some(mut job) = row else {
		tx.commit().await?;

		return Ok(None);
	};
	// The stored lease is read back because it doubles as the claim token and Postgres keeps
	// microseconds only.
	let lease_until = sqlx::query_scalar::<_, OffsetDateTime>(
		"\
UPDATE extraction_outbox
SET status = 'CLAIMED', available_at = $1, updated_at = $2
WHERE outbox_id = $3
RETURNING available_at",
	)
	.bind(now + Duration::seconds(lease_seconds))
	.bind(now)
	.bind(job.outbox_id)
	.fetch_one(&mut *tx)
	.await?;

	tx.commit().await?;

	job.status = "CLAIMED".to_string();
	job.available_at = lease_until;
	job.updated_at = now;

	Ok(Some(job))
}

/// The `mark_*` writes apply only while the caller's claim is still the current one: the job is
/// CLAIMED and its lease equals `claimed_until` from [`claim_next_extraction`]. `false` means the
/// claim expired and another worker owns the job now.
pub async fn mark_extraction_done<'e, E>(
	executor: E,
	outbox_id: Uuid,
	claimed_until: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE extraction_outbox
SET status = 'DONE', last_error = NULL, updated_at = $1
WHERE outbox_id = $2 AND status = 'CLAIMED' AND available_at = $3",
	)
	.bind(now)
	.bind(outbox_id)
	.bind(claimed_until)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Records a failed attempt. The job becomes claimable again at `available_at`.
pub async fn mark_extraction_failed<'e, E>(
	executor: E,
	outbox_id: Uuid,
	claimed_until: OffsetDateTime,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE extraction_outbox
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE outbox_id = $5 AND status = 'CLAIMED' AND available_at = $6",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(outbox_id)
	.bind(claimed_until)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Parks a job that will not be retried.
pub async fn mark_extraction_dead<'e, E>(
	executor: E,
	outbox_id: Uuid,
	claimed_until: OffsetDateTime,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE extraction_outbox
SET status = 'DEAD', attempts = $1, last_error = $2, updated_at = $3
WHERE outbox_id = $4 AND status = 'CLAIMED' AND available_at = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(now)
	.bind(outbox_id)
	.bind(claimed_until)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn get_extraction<'e, E>(executor: E, outbox_id: Uuid) -> Result<Option<ExtractionJob>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, ExtractionJob>(
		"\
SELECT
	outbox_id,
	mailbox_id,
	message_id,
	thread_id,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM extraction_outbox
WHERE outbox_id = $1",
	)
	.bind(outbox_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Removes finished jobs last touched before `cutoff`.
pub async fn purge_finished<'e, E>(executor: E, cutoff: OffsetDateTime) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"DELETE FROM extraction_outbox WHERE status IN ('DONE', 'DEAD') AND updated_at < $1",
	)
	.bind(cutoff)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}
