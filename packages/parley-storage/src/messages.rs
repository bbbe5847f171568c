use sqlx::{PgConnection, PgExecutor};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{Conversation, MailMessage},
};
use parley_domain::thread::Direction;

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
	pub mailbox_id: Uuid,
	pub message_id: &'a str,
	pub thread_id: &'a str,
	pub direction: Direction,
	pub sender: &'a str,
	pub subject: &'a str,
	pub body_text: &'a str,
	pub received_at: OffsetDateTime,
	pub outbound_send_id: Option<Uuid>,
}

/// Inserts the message and, only when it was not stored before, bumps its conversation. Run it
/// inside a transaction so both writes land together. Returns whether the message was new.
pub async fn insert_message(conn: &mut PgConnection, message: &NewMessage<'_>) -> Result<bool> {
	let inserted = sqlx::query_scalar::<_, String>(
		"\
INSERT INTO mail_messages (
	mailbox_id,
	message_id,
	thread_id,
	direction,
	sender,
	subject,
	body_text,
	received_at,
	outbound_send_id
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (mailbox_id, message_id) DO NOTHING
RETURNING message_id",
	)
	.bind(message.mailbox_id)
	.bind(message.message_id)
	.bind(message.thread_id)
	.bind(message.direction.as_str())
	.bind(message.sender)
	.bind(message.subject)
	.bind(message.body_text)
	.bind(message.received_at)
	.bind(message.outbound_send_id)
	.fetch_optional(&mut *conn)
	.await?;

	if inserted.is_none() {
		return Ok(false);
	}

	sqlx::query(
		"\
INSERT INTO conversations (mailbox_id, thread_id, last_message_at, message_count, created_at, updated_at)
VALUES ($1, $2, $3, 1, now(), now())
ON CONFLICT (mailbox_id, thread_id) DO UPDATE
SET last_message_at = GREATEST(conversations.last_message_at, EXCLUDED.last_message_at),
	message_count = conversations.message_count + 1,
	updated_at = now()",
	)
	.bind(message.mailbox_id)
	.bind(message.thread_id)
	.bind(message.received_at)
	.execute(&mut *conn)
	.await?;

	Ok(true)
}

/// Fills the outbound-send link on a stored message. Never overwrites an existing link.
pub async fn backfill_outbound_send<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	message_id: &str,
	send_id: Uuid,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE mail_messages
SET outbound_send_id = $3
WHERE mailbox_id = $1 AND message_id = $2 AND outbound_send_id IS NULL",
	)
	.bind(mailbox_id)
	.bind(message_id)
	.bind(send_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn message_exists<'e, E>(executor: E, mailbox_id: Uuid, message_id: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let exists = sqlx::query_scalar::<_, bool>(
		"SELECT EXISTS (SELECT 1 FROM mail_messages WHERE mailbox_id = $1 AND message_id = $2)",
	)
	.bind(mailbox_id)
	.bind(message_id)
	.fetch_one(executor)
	.await?;

	Ok(exists)
}

/// Every stored message of a thread, oldest first.
pub async fn thread_messages<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	thread_id: &str,
) -> Result<Vec<MailMessage>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, MailMessage>(
		"\
SELECT
	mailbox_id,
	message_id,
	thread_id,
	direction,
	sender,
	subject,
	body_text,
	received_at,
	outbound_send_id
FROM mail_messages
WHERE mailbox_id = $1 AND thread_id = $2
ORDER BY received_at ASC, message_id ASC",
	)
	.bind(mailbox_id)
	.bind(thread_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn get_conversation<'e, E>(
	executor: E,
	mailbox_id: Uuid,
	thread_id: &str,
) -> Result<Option<Conversation>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Conversation>(
		"\
SELECT mailbox_id, thread_id, last_message_at, message_count
FROM conversations
WHERE mailbox_id = $1 AND thread_id = $2",
	)
	.bind(mailbox_id)
	.bind(thread_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
