use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::MeetingSuggestion};
use parley_domain::suggestion::SuggestionStatus;

const SUGGESTION_COLUMNS: &str = "\
suggestion_id,
	mailbox_id,
	thread_id,
	source_message_id,
	status,
	extracted_data,
	confidence,
	calendar_event_id,
	created_at,
	updated_at";

#[derive(Debug, Clone)]
pub struct NewSuggestion<'a> {
	pub mailbox_id: Uuid,
	pub thread_id: &'a str,
	pub source_message_id: &'a str,
	pub extracted_data: Value,
	pub confidence: f32,
}

pub async fn suggestion_exists<'e, E>(executor: E, mailbox_id: Uuid, thread_id: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let exists = sqlx::query_scalar::<_, bool>(
		"SELECT EXISTS (SELECT 1 FROM meeting_suggestions WHERE mailbox_id = $1 AND thread_id = $2)",
	)
	.bind(mailbox_id)
	.bind(thread_id)
	.fetch_one(executor)
	.await?;

	Ok(exists)
}

/// Inserts a PENDING suggestion unless the thread already has one, in any status. `None` means
/// the thread was already suggested.
pub async fn create_if_absent<'e, E>(
	executor: E,
	suggestion: &NewSuggestion<'_>,
	now: OffsetDateTime,
) -> Result<Option<MeetingSuggestion>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO meeting_suggestions (
	suggestion_id,
	mailbox_id,
	thread_id,
	source_message_id,
	status,
	extracted_data,
	confidence,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
ON CONFLICT (mailbox_id, thread_id) DO NOTHING
RETURNING {SUGGESTION_COLUMNS}"
	);
	let row = sqlx::query_as::<_, MeetingSuggestion>(&sql)
		.bind(Uuid::new_v4())
		.bind(suggestion.mailbox_id)
		.bind(suggestion.thread_id)
		.bind(suggestion.source_message_id)
		.bind(SuggestionStatus::Pending.as_str())
		.bind(&suggestion.extracted_data)
		.bind(suggestion.confidence)
		.bind(now)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn get_suggestion<'e, E>(executor: E, suggestion_id: Uuid) -> Result<Option<MeetingSuggestion>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {SUGGESTION_COLUMNS} FROM meeting_suggestions WHERE suggestion_id = $1");
	let row = sqlx::query_as::<_, MeetingSuggestion>(&sql)
		.bind(suggestion_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Newest first, optionally narrowed to one status.
pub async fn list_suggestions<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	status: Option<SuggestionStatus>,
	limit: i64,
) -> Result<Vec<MeetingSuggestion>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {SUGGESTION_COLUMNS}
FROM meeting_suggestions
WHERE mailbox_id = $1 AND ($2::text IS NULL OR status = $2)
ORDER BY created_at DESC, suggestion_id DESC
LIMIT $3"
	);
	let rows = sqlx::query_as::<_, MeetingSuggestion>(&sql)
		.bind(mailbox_id)
		.bind(status.map(SuggestionStatus::as_str))
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Moves a PENDING suggestion to `next`. `None` means the row is missing, no longer PENDING, or
/// held by an acceptance in flight.
pub async fn resolve_pending<'e, E>(
	executor: E,
	suggestion_id: Uuid,
	next: SuggestionStatus,
	calendar_event_id: Option<&str>,
	now: OffsetDateTime,
) -> Result<Option<MeetingSuggestion>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE meeting_suggestions
SET status = $2,
	calendar_event_id = COALESCE($3, calendar_event_id),
	accepting_until = NULL,
	updated_at = $4
WHERE suggestion_id = $1
	AND status = 'PENDING'
	AND (accepting_until IS NULL OR accepting_until <= $4)
RETURNING {SUGGESTION_COLUMNS}"
	);
	let row = sqlx::query_as::<_, MeetingSuggestion>(&sql)
		.bind(suggestion_id)
		.bind(next.as_str())
		.bind(calendar_event_id)
		.bind(now)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Reserves a PENDING suggestion for one acceptance until `until`. The returned instant is the
/// claim token for [`finish_acceptance`] and [`release_acceptance`]; `None` means the row is
/// missing, no longer PENDING, or already claimed.
pub async fn claim_acceptance<'e, E>(
	executor: E,
	suggestion_id: Uuid,
	now: OffsetDateTime,
	until: OffsetDateTime,
) -> Result<Option<OffsetDateTime>>
where
	E: PgExecutor<'e>,
{
	let claimed_until = sqlx::query_scalar::<_, OffsetDateTime>(
		"\
UPDATE meeting_suggestions
SET accepting_until = $3
WHERE suggestion_id = $1
	AND status = 'PENDING'
	AND (accepting_until IS NULL OR accepting_until <= $2)
RETURNING accepting_until",
	)
	.bind(suggestion_id)
	.bind(now)
	.bind(until)
	.fetch_optional(executor)
	.await?;

	Ok(claimed_until)
}

/// Marks a claimed suggestion ACCEPTED with its calendar event. `None` means the claim lapsed and
/// the row was taken over or resolved meanwhile.
pub async fn finish_acceptance<'e, E>(
	executor: E,
	suggestion_id: Uuid,
	claimed_until: OffsetDateTime,
	calendar_event_id: &str,
	now: OffsetDateTime,
) -> Result<Option<MeetingSuggestion>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
UPDATE meeting_suggestions
SET status = 'ACCEPTED',
	calendar_event_id = $3,
	accepting_until = NULL,
	updated_at = $4
WHERE suggestion_id = $1 AND status = 'PENDING' AND accepting_until = $2
RETURNING {SUGGESTION_COLUMNS}"
	);
	let row = sqlx::query_as::<_, MeetingSuggestion>(&sql)
		.bind(suggestion_id)
		.bind(claimed_until)
		.bind(calendar_event_id)
		.bind(now)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn release_acceptance<'e, E>(
	executor: E,
	suggestion_id: Uuid,
	claimed_until: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE meeting_suggestions
SET accepting_until = NULL
WHERE suggestion_id = $1 AND status = 'PENDING' AND accepting_until = $2",
	)
	.bind(suggestion_id)
	.bind(claimed_until)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}
