use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Mailbox {
	pub mailbox_id: Uuid,
	pub user_id: String,
	pub email_address: String,
	pub access_token: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncState {
	pub mailbox_id: Uuid,
	pub email_address: String,
	pub cursor_token: Option<String>,
	pub cursor_updated_at: Option<OffsetDateTime>,
	pub lease_expires_at: Option<OffsetDateTime>,
	pub sync_lease_owner: Option<Uuid>,
	pub sync_lease_until: Option<OffsetDateTime>,
	pub resync_requested: bool,
	pub last_synced_at: Option<OffsetDateTime>,
	pub updated_at: OffsetDateTime,
}

/// A mailbox whose push subscription is due for renewal.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaseCandidate {
	pub mailbox_id: Uuid,
	pub email_address: String,
	pub access_token: String,
	pub lease_expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MailMessage {
	pub mailbox_id: Uuid,
	pub message_id: String,
	pub thread_id: String,
	pub direction: String,
	pub sender: String,
	pub subject: String,
	pub body_text: String,
	pub received_at: OffsetDateTime,
	pub outbound_send_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
	pub mailbox_id: Uuid,
	pub thread_id: String,
	pub last_message_at: OffsetDateTime,
	pub message_count: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExtractionJob {
	pub outbox_id: Uuid,
	pub mailbox_id: Uuid,
	pub message_id: String,
	pub thread_id: String,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeetingSuggestion {
	pub suggestion_id: Uuid,
	pub mailbox_id: Uuid,
	pub thread_id: String,
	pub source_message_id: String,
	pub status: String,
	pub extracted_data: Value,
	pub confidence: f32,
	pub calendar_event_id: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
