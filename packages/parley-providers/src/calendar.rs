use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result};
use parley_config::CalendarProviderConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
	pub summary: String,
	pub start: OffsetDateTime,
	pub end: OffsetDateTime,
	pub location: Option<String>,
	pub description: Option<String>,
	pub attendees: Vec<String>,
}

/// Google Calendar events client.
#[derive(Clone)]
pub struct CalendarClient {
	cfg: CalendarProviderConfig,
	http: Client,
}
impl CalendarClient {
	pub fn new(cfg: CalendarProviderConfig) -> Result<Self> {
		let http = crate::http_client(cfg.timeout_ms)?;

		Ok(Self { cfg, http })
	}

	/// Inserts the event and returns the provider's event id.
	pub async fn create_event(&self, access_token: &str, event: &NewEvent) -> Result<String> {
		let url = format!(
			"{}/calendar/v3/calendars/{}/events",
			self.cfg.api_base, self.cfg.calendar_id
		);
		let res = self
			.http
			.post(&url)
			.bearer_auth(access_token)
			.json(&EventBody::from_event(event)?)
			.send()
			.await?;
		let created: CreatedEvent = crate::check_status(res).await?.json().await?;

		Ok(created.id)
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody<'a> {
	summary: &'a str,
	start: EventTime,
	end: EventTime,
	#[serde(skip_serializing_if = "Option::is_none")]
	location: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	description: Option<&'a str>,
	attendees: Vec<Attendee<'a>>,
}
impl<'a> EventBody<'a> {
	fn from_event(event: &'a NewEvent) -> Result<Self> {
		Ok(Self {
			summary: &event.summary,
			start: EventTime::new(event.start)?,
			end: EventTime::new(event.end)?,
			location: event.location.as_deref(),
			description: event.description.as_deref(),
			attendees: event.attendees.iter().map(|email| Attendee { email }).collect(),
		})
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
	date_time: String,
}
impl EventTime {
	fn new(at: OffsetDateTime) -> Result<Self> {
		let date_time = at
			.format(&time::format_description::well_known::Rfc3339)
			.map_err(|err| Error::InvalidConfig { message: err.to_string() })?;

		Ok(Self { date_time })
	}
}

#[derive(Debug, Serialize)]
struct Attendee<'a> {
	email: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
	id: String,
}
