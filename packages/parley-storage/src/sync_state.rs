//! Per-mailbox sync state: the history cursor, the push-subscription lease and the cross-process
//! sync lease that serializes syncs for one mailbox.

use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{LeaseCandidate, SyncState},
};

const SYNC_STATE_COLUMNS: &str = "\
mailbox_id,
	email_address,
	cursor_token,
	cursor_updated_at,
	lease_expires_at,
	sync_lease_owner,
	sync_lease_until,
	resync_requested,
	last_synced_at,
	updated_at";

pub async fn ensure_sync_state<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	email_address: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO sync_states (mailbox_id, email_address, created_at, updated_at)
VALUES ($1, $2, $3, $3)
ON CONFLICT (mailbox_id) DO NOTHING",
	)
	.bind(mailbox_id)
	.bind(email_address)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_sync_state<'e, E>(executor: E, mailbox_id: Uuid) -> Result<Option<SyncState>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {SYNC_STATE_COLUMNS} FROM sync_states WHERE mailbox_id = $1");
	let row = sqlx::query_as::<_, SyncState>(&sql).bind(mailbox_id).fetch_optional(executor).await?;

	Ok(row)
}

/// Takes the sync lease when it is free or expired. `None` means another runner holds it.
pub async fn claim_sync_lease<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	owner: Uuid,
	now: OffsetDateTime,
	lease_until: OffsetDateTime,
) -> Result<Option<SyncState>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE sync_states
SET sync_lease_owner = $2,
	sync_lease_until = $4,
	resync_requested = false,
	updated_at = $3
WHERE mailbox_id = $1
	AND (sync_lease_owner IS NULL OR sync_lease_until IS NULL OR sync_lease_until <= $3)
RETURNING {SYNC_STATE_COLUMNS}"
	);
	let row = sqlx::query_as::<_, SyncState>(&sql)
		.bind(mailbox_id)
		.bind(owner)
		.bind(now)
		.bind(lease_until)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Leaves a note for the current lease holder to run one more pass.
pub async fn request_resync<'e, E>(executor: E, mailbox_id: Uuid, now: OffsetDateTime) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"UPDATE sync_states SET resync_requested = true, updated_at = $2 WHERE mailbox_id = $1",
	)
	.bind(mailbox_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Ends a successful pass. When a resync was requested meanwhile, the lease is kept and extended
/// to `lease_until` and `true` is returned so the holder runs again; otherwise the lease is
/// released. Returns `false` as well when the lease was already lost.
pub async fn finish_sync_pass<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	owner: Uuid,
	now: OffsetDateTime,
	lease_until: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let rerun = sqlx::query_scalar::<_, bool>(
		"\
UPDATE sync_states
SET sync_lease_owner = CASE WHEN resync_requested THEN sync_lease_owner ELSE NULL END,
	sync_lease_until = CASE WHEN resync_requested THEN $4 ELSE NULL END,
	resync_requested = false,
	last_synced_at = $3,
	updated_at = $3
WHERE mailbox_id = $1 AND sync_lease_owner = $2
RETURNING sync_lease_owner IS NOT NULL",
	)
	.bind(mailbox_id)
	.bind(owner)
	.bind(now)
	.bind(lease_until)
	.fetch_optional(executor)
	.await?;

	Ok(rerun.unwrap_or(false))
}

/// Drops the lease after a failed pass. A pending resync request stays for the next claimer.
pub async fn release_sync_lease<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	owner: Uuid,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE sync_states
SET sync_lease_owner = NULL, sync_lease_until = NULL, updated_at = $3
WHERE mailbox_id = $1 AND sync_lease_owner = $2",
	)
	.bind(mailbox_id)
	.bind(owner)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Moves the cursor forward and extends the sync lease. The write only lands while `owner` still
/// holds a live lease and `cursor` does not sort before the stored token (length first, then
/// lexicographic, which matches numeric order for history ids).
pub async fn advance_cursor<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	owner: Uuid,
	cursor: &str,
	now: OffsetDateTime,
	lease_until: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE sync_states
SET cursor_token = $3::text,
	cursor_updated_at = $4,
	sync_lease_until = $5,
	updated_at = $4
WHERE mailbox_id = $1
	AND sync_lease_owner = $2
	AND sync_lease_until > $4
	AND (
		cursor_token IS NULL
		OR (length(cursor_token), cursor_token) <= (length($3::text), $3::text)
	)",
	)
	.bind(mailbox_id)
	.bind(owner)
	.bind(cursor)
	.bind(now)
	.bind(lease_until)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Mailboxes with no push lease yet or one expiring at or before `window_end`.
pub async fn due_leases<'e, E>(executor: E, window_end: OffsetDateTime) -> Result<Vec<LeaseCandidate>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, LeaseCandidate>(
		"\
SELECT m.mailbox_id, m.email_address, m.access_token, s.lease_expires_at
FROM mailboxes m
LEFT JOIN sync_states s ON s.mailbox_id = m.mailbox_id
WHERE s.lease_expires_at IS NULL OR s.lease_expires_at <= $1
ORDER BY s.lease_expires_at ASC NULLS FIRST, m.mailbox_id",
	)
	.bind(window_end)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Stores a renewed push lease and seeds the cursor when none exists. Returns `false` when the new
/// expiry would not move the stored one forward.
pub async fn record_lease<'e, E>(
	executor: E,
	candidate: &LeaseCandidate,
	lease_expires_at: OffsetDateTime,
	cursor: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO sync_states (
	mailbox_id,
	email_address,
	cursor_token,
	cursor_updated_at,
	lease_expires_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $5, $4, $5, $5)
ON CONFLICT (mailbox_id) DO UPDATE
SET lease_expires_at = EXCLUDED.lease_expires_at,
	cursor_token = COALESCE(sync_states.cursor_token, EXCLUDED.cursor_token),
	cursor_updated_at = CASE
		WHEN sync_states.cursor_token IS NULL THEN EXCLUDED.cursor_updated_at
		ELSE sync_states.cursor_updated_at
	END,
	updated_at = EXCLUDED.updated_at
WHERE sync_states.lease_expires_at IS NULL
	OR sync_states.lease_expires_at < EXCLUDED.lease_expires_at",
	)
	.bind(candidate.mailbox_id)
	.bind(&candidate.email_address)
	.bind(cursor)
	.bind(lease_expires_at)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}
