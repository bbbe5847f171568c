//! Push notification intake: decode, dedup, resolve the mailbox, hand off to sync.

use std::sync::Arc;

use base64::{
	Engine as _,
	alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, ParleyService, Result};
use parley_storage::{ledger, mailboxes};

const LENIENT: GeneralPurposeConfig =
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
	pub message: PushMessage,
	#[serde(default)]
	pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
	pub data: String,
	#[serde(default, alias = "message_id")]
	pub message_id: Option<String>,
}

/// The decoded payload of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailNotification {
	#[serde(alias = "emailAddress")]
	pub mailbox_address: String,
	pub history_id: HistoryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HistoryId {
	Number(u64),
	Text(String),
}
impl HistoryId {
	pub fn as_string(&self) -> String {
		match self {
			Self::Number(value) => value.to_string(),
			Self::Text(value) => value.clone(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
	/// The ledger already held this notification.
	Duplicate,
	/// No mailbox matched the address.
	Unresolved,
	Dispatched { mailbox_id: Uuid },
}

pub fn decode_envelope(envelope: &PushEnvelope) -> Result<MailNotification> {
	let data = envelope.message.data.trim();
	let bytes = STANDARD.decode(data).or_else(|_| URL_SAFE.decode(data)).map_err(|_| {
		Error::InvalidRequest { message: "Push message data is not valid base64.".to_string() }
	})?;
	let notification: MailNotification =
		serde_json::from_slice(&bytes).map_err(|err| Error::InvalidRequest {
			message: format!("Push message data is not a mail notification: {err}."),
		})?;

	if notification.mailbox_address.trim().is_empty() {
		return Err(Error::InvalidRequest {
			message: "Push message mailbox address is empty.".to_string(),
		});
	}

	Ok(notification)
}

/// The push message id when present, otherwise a digest of address and history id so that a
/// redelivery of the same change maps to the same key.
pub fn notification_id(envelope: &PushEnvelope, notification: &MailNotification) -> String {
	if let Some(message_id) = envelope.message.message_id.as_deref().map(str::trim)
		&& !message_id.is_empty()
	{
		return message_id.to_string();
	}

	let mut hasher = blake3::Hasher::new();

	hasher.update(notification.mailbox_address.trim().to_lowercase().as_bytes());
	hasher.update(b"\n");
	hasher.update(notification.history_id.as_string().as_bytes());

	format!("digest:{}", hasher.finalize().to_hex())
}

impl ParleyService {
	/// Records, resolves and dispatches one push notification. Sync runs on a spawned task; its
	/// failures only reach the logs.
	pub async fn receive_notification(
		self: &Arc<Self>,
		envelope: &PushEnvelope,
	) -> Result<NotificationOutcome> {
		let notification = decode_envelope(envelope)?;
		let id = notification_id(envelope, &notification);
		let now = OffsetDateTime::now_utc();

		if !ledger::record_if_new(&self.db.pool, &id, now).await? {
			tracing::debug!(notification_id = %id, "Duplicate push notification ignored.");

			return Ok(NotificationOutcome::Duplicate);
		}

		let Some(mailbox_id) = self.resolve_mailbox(&notification.mailbox_address).await? else {
			tracing::warn!(
				notification_id = %id,
				mailbox_address = %notification.mailbox_address,
				"Push notification for an unknown mailbox."
			);

			return Ok(NotificationOutcome::Unresolved);
		};

		tracing::info!(
			mailbox_id = %mailbox_id,
			history_id = %notification.history_id.as_string(),
			"Push notification accepted."
		);
		self.spawn_sync(mailbox_id);

		Ok(NotificationOutcome::Dispatched { mailbox_id })
	}

	/// Primary lookup on the mailbox address, then the address recorded in sync state.
	pub async fn resolve_mailbox(&self, address: &str) -> Result<Option<Uuid>> {
		if let Some(mailbox_id) = mailboxes::find_mailbox_id_by_address(&self.db.pool, address).await?
		{
			return Ok(Some(mailbox_id));
		}

		Ok(mailboxes::find_mailbox_id_by_sync_address(&self.db.pool, address).await?)
	}

	pub fn spawn_sync(self: &Arc<Self>, mailbox_id: Uuid) {
		let service = Arc::clone(self);

		tokio::spawn(async move {
			service.run_sync(mailbox_id).await;
		});
	}
}
