use base64::{
	Engine as _,
	alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::{Error, Result};
use parley_config::MailProviderConfig;

const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One page of the incremental change set after a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePage {
	/// Added message ids in provider order, deduplicated.
	pub message_ids: Vec<String>,
	pub next_page_token: Option<String>,
	/// Position that is safe to resume from once this page is applied: the last history record
	/// id on intermediate pages, the mailbox's current history id on the final page.
	pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMessage {
	pub id: String,
	pub thread_id: String,
	pub label_ids: Vec<String>,
	pub sender: String,
	pub subject: String,
	pub body_text: String,
	pub received_at: OffsetDateTime,
}
impl ProviderMessage {
	pub fn has_label(&self, label: &str) -> bool {
		self.label_ids.iter().any(|l| l == label)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchLease {
	pub cursor: String,
	pub lease_expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
	pub email_address: String,
	pub cursor: String,
}

/// Gmail REST client. Every call is made on behalf of the mailbox whose OAuth access token is
/// passed in.
#[derive(Clone)]
pub struct GmailClient {
	cfg: MailProviderConfig,
	http: Client,
}
impl GmailClient {
	pub fn new(cfg: MailProviderConfig) -> Result<Self> {
		let http = crate::http_client(cfg.timeout_ms)?;

		Ok(Self { cfg, http })
	}

	pub fn topic_name(&self) -> &str {
		&self.cfg.topic_name
	}

	/// Fails with [`Error::CursorExpired`] when the provider no longer keeps history that far back.
	pub async fn changes_since(
		&self,
		access_token: &str,
		cursor: &str,
		page_token: Option<&str>,
	) -> Result<ChangePage> {
		let mut query = vec![("startHistoryId", cursor), ("historyTypes", "messageAdded")];

		if let Some(page_token) = page_token {
			query.push(("pageToken", page_token));
		}

		let res = self
			.http
			.get(self.url("/users/me/history"))
			.bearer_auth(access_token)
			.query(&query)
			.send()
			.await?;

		if res.status() == StatusCode::NOT_FOUND {
			return Err(Error::CursorExpired);
		}

		let raw: HistoryResponse = crate::check_status(res).await?.json().await?;

		Ok(raw.into_page())
	}

	/// Newest message ids, capped at `max_results`.
	pub async fn list_recent(&self, access_token: &str, max_results: u32) -> Result<Vec<String>> {
		let res = self
			.http
			.get(self.url("/users/me/messages"))
			.bearer_auth(access_token)
			.query(&[("maxResults", max_results.to_string())])
			.send()
			.await?;
		let raw: ListResponse = crate::check_status(res).await?.json().await?;

		Ok(raw.messages.into_iter().map(|m| m.id).collect())
	}

	pub async fn profile(&self, access_token: &str) -> Result<Profile> {
		let res = self
			.http
			.get(self.url("/users/me/profile"))
			.bearer_auth(access_token)
			.send()
			.await?;
		let raw: ProfileResponse = crate::check_status(res).await?.json().await?;

		Ok(Profile { email_address: raw.email_address, cursor: raw.history_id })
	}

	pub async fn get_message(&self, access_token: &str, message_id: &str) -> Result<ProviderMessage> {
		let res = self
			.http
			.get(self.url(&format!("/users/me/messages/{message_id}")))
			.bearer_auth(access_token)
			.query(&[("format", "full")])
			.send()
			.await?;
		let raw: MessageResponse = crate::check_status(res).await?.json().await?;

		raw.into_message()
	}

	/// Reissues the push subscription for the mailbox.
	pub async fn subscribe(&self, access_token: &str, topic_name: &str) -> Result<WatchLease> {
		let res = self
			.http
			.post(self.url("/users/me/watch"))
			.bearer_auth(access_token)
			.json(&serde_json::json!({ "topicName": topic_name }))
			.send()
			.await?;
		let raw: WatchResponse = crate::check_status(res).await?.json().await?;
		let lease_expires_at = parse_millis(&raw.expiration).ok_or_else(|| Error::InvalidResponse {
			message: format!("Watch expiration {:?} is not epoch milliseconds.", raw.expiration),
		})?;

		Ok(WatchLease { cursor: raw.history_id, lease_expires_at })
	}

	fn url(&self, path: &str) -> String {
		format!("{}/gmail/v1{path}", self.cfg.api_base)
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
	#[serde(default)]
	history: Vec<HistoryRecord>,
	next_page_token: Option<String>,
	history_id: String,
}
impl HistoryResponse {
	fn into_page(self) -> ChangePage {
		let mut message_ids: Vec<String> = Vec::new();
		let mut last_record_id = None;

		for record in self.history {
			last_record_id = Some(record.id);

			for added in record.messages_added {
				if !message_ids.contains(&added.message.id) {
					message_ids.push(added.message.id);
				}
			}
		}

		let cursor = match self.next_page_token {
			Some(_) => last_record_id,
			None => Some(self.history_id),
		};

		ChangePage { message_ids, next_page_token: self.next_page_token, cursor }
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
	id: String,
	#[serde(default)]
	messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
	message: MessageRef,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
	id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
	#[serde(default)]
	messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
	email_address: String,
	history_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
	history_id: String,
	expiration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
	id: String,
	thread_id: String,
	#[serde(default)]
	label_ids: Vec<String>,
	#[serde(default)]
	snippet: String,
	internal_date: Option<String>,
	payload: Option<Part>,
}
impl MessageResponse {
	fn into_message(self) -> Result<ProviderMessage> {
		let received_at = self.internal_date.as_deref().and_then(parse_millis).ok_or_else(|| {
			Error::InvalidResponse {
				message: format!("Message {} has no usable internalDate.", self.id),
			}
		})?;
		let (sender, subject, body_text) = match &self.payload {
			Some(payload) => (
				payload.header("From").unwrap_or_default().to_string(),
				payload.header("Subject").unwrap_or_default().to_string(),
				payload.plain_text().unwrap_or_else(|| self.snippet.clone()),
			),
			None => (String::new(), String::new(), self.snippet.clone()),
		};

		Ok(ProviderMessage {
			id: self.id,
			thread_id: self.thread_id,
			label_ids: self.label_ids,
			sender: address_of(&sender).to_string(),
			subject,
			body_text,
			received_at,
		})
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
	#[serde(default)]
	mime_type: String,
	#[serde(default)]
	headers: Vec<Header>,
	body: Option<PartBody>,
	#[serde(default)]
	parts: Vec<Part>,
}
impl Part {
	fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)).map(|h| h.value.as_str())
	}

	/// First `text/plain` body, depth first.
	fn plain_text(&self) -> Option<String> {
		if self.mime_type.eq_ignore_ascii_case("text/plain")
			&& let Some(data) = self.body.as_ref().and_then(|b| b.data.as_deref())
		{
			return decode_body(data);
		}

		self.parts.iter().find_map(Part::plain_text)
	}
}

#[derive(Debug, Deserialize)]
struct Header {
	name: String,
	value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
	data: Option<String>,
}

fn decode_body(data: &str) -> Option<String> {
	let bytes = BODY_ENGINE.decode(data.trim()).ok()?;

	Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_millis(raw: &str) -> Option<OffsetDateTime> {
	let millis: i64 = raw.trim().parse().ok()?;

	OffsetDateTime::UNIX_EPOCH.checked_add(Duration::milliseconds(millis))
}

/// `"Ada Lovelace <ada@example.com>"` -> `"ada@example.com"`.
pub fn address_of(from: &str) -> &str {
	match (from.rfind('<'), from.rfind('>')) {
		(Some(open), Some(close)) if open < close => from[open + 1..close].trim(),
		_ => from.trim(),
	}
}
