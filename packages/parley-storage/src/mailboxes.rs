use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::Mailbox};

pub async fn insert_mailbox<'e, E>(
	executor: E,
	user_id: &str,
	email_address: &str,
	access_token: &str,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let mailbox_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO mailboxes (mailbox_id, user_id, email_address, access_token)
VALUES ($1, $2, $3, $4)",
	)
	.bind(mailbox_id)
	.bind(user_id)
	.bind(email_address)
	.bind(access_token)
	.execute(executor)
	.await?;

	Ok(mailbox_id)
}

pub async fn get_mailbox<'e, E>(executor: E, mailbox_id: Uuid) -> Result<Option<Mailbox>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Mailbox>(
		"\
SELECT mailbox_id, user_id, email_address, access_token
FROM mailboxes
WHERE mailbox_id = $1",
	)
	.bind(mailbox_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Primary lookup for a push notification's address.
pub async fn find_mailbox_id_by_address<'e, E>(executor: E, address: &str) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_scalar::<_, Uuid>(
		"SELECT mailbox_id FROM mailboxes WHERE lower(email_address) = lower($1)",
	)
	.bind(address.trim())
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Fallback lookup through the address recorded when sync state was created, which survives a
/// mailbox whose primary address was later changed.
pub async fn find_mailbox_id_by_sync_address<'e, E>(
	executor: E,
	address: &str,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_scalar::<_, Uuid>(
		"\
SELECT mailbox_id
FROM sync_states
WHERE lower(email_address) = lower($1)
ORDER BY updated_at DESC
LIMIT 1",
	)
	.bind(address.trim())
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn record_outbound_send<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	thread_id: &str,
	provider_message_id: Option<&str>,
	recipient: &str,
	sent_at: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let send_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO outbound_sends (send_id, mailbox_id, thread_id, provider_message_id, recipient, sent_at)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(send_id)
	.bind(mailbox_id)
	.bind(thread_id)
	.bind(provider_message_id)
	.bind(recipient)
	.bind(sent_at)
	.execute(executor)
	.await?;

	Ok(send_id)
}

/// True when the system sent mail into this thread, i.e. replies in it are worth scanning.
pub async fn thread_was_initiated<'e, E>(executor: E, mailbox_id: Uuid, thread_id: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let exists = sqlx::query_scalar::<_, bool>(
		"SELECT EXISTS (SELECT 1 FROM outbound_sends WHERE mailbox_id = $1 AND thread_id = $2)",
	)
	.bind(mailbox_id)
	.bind(thread_id)
	.fetch_one(executor)
	.await?;

	Ok(exists)
}

/// The outbound send a SENT message belongs to: an exact provider-id match first, otherwise the
/// latest send into the same thread.
pub async fn match_outbound_send<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	message_id: &str,
	thread_id: &str,
) -> Result<Option<Uuid>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_scalar::<_, Uuid>(
		"\
SELECT send_id
FROM outbound_sends
WHERE mailbox_id = $1 AND (provider_message_id = $2 OR thread_id = $3)
ORDER BY (provider_message_id = $2) IS TRUE DESC, sent_at DESC
LIMIT 1",
	)
	.bind(mailbox_id)
	.bind(message_id)
	.bind(thread_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
