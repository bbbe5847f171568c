use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, ParleyService, Result};
use parley_domain::{meeting::ExtractedMeetingData, rfc3339, suggestion::SuggestionStatus};
use parley_providers::calendar::NewEvent;
use parley_storage::{mailboxes, models::MeetingSuggestion, suggestions};

pub const MAX_LIST_LIMIT: u32 = 200;

/// Added to the calendar timeout so a claim outlives the slowest event creation.
const ACCEPT_CLAIM_MARGIN: Duration = Duration::seconds(30);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionView {
	pub suggestion_id: Uuid,
	pub mailbox_id: Uuid,
	pub thread_id: String,
	pub source_message_id: String,
	pub status: SuggestionStatus,
	pub extracted_data: ExtractedMeetingData,
	pub confidence: f32,
	pub calendar_event_id: Option<String>,
	#[serde(with = "rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl TryFrom<MeetingSuggestion> for SuggestionView {
	type Error = Error;

	fn try_from(row: MeetingSuggestion) -> Result<Self> {
		let status =
			row.status.parse::<SuggestionStatus>().map_err(|message| Error::Storage { message })?;
		let extracted_data =
			serde_json::from_value(row.extracted_data).map_err(|err| Error::Storage {
				message: format!(
					"Suggestion {} has unreadable meeting data: {err}.",
					row.suggestion_id
				),
			})?;

		Ok(Self {
			suggestion_id: row.suggestion_id,
			mailbox_id: row.mailbox_id,
			thread_id: row.thread_id,
			source_message_id: row.source_message_id,
			status,
			extracted_data,
			confidence: row.confidence,
			calendar_event_id: row.calendar_event_id,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

impl ParleyService {
	pub async fn list_suggestions(
		&self,
		mailbox_id: Uuid,
		status: Option<SuggestionStatus>,
		limit: Option<u32>,
	) -> Result<Vec<SuggestionView>> {
		let limit = limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT);
		let rows =
			suggestions::list_suggestions(&self.db.pool, mailbox_id, status, i64::from(limit)).await?;

		rows.into_iter().map(SuggestionView::try_from).collect()
	}

	pub async fn get_suggestion(&self, suggestion_id: Uuid) -> Result<SuggestionView> {
		self.load_suggestion(suggestion_id).await
	}

	/// Books the meeting on the mailbox owner's calendar, then marks the suggestion ACCEPTED.
	///
	/// The suggestion is claimed before the calendar call, so concurrent accepts book at most one
	/// event and a dismiss cannot slip in between.
	pub async fn accept_suggestion(&self, suggestion_id: Uuid) -> Result<SuggestionView> {
		let current = self.load_suggestion(suggestion_id).await?;

		current.status.transition(SuggestionStatus::Accepted)?;

		let data = &current.extracted_data;
		let Some(start) = data.start_time else {
			return Err(Error::InvalidRequest {
				message: "Suggestion has no start time; confirm the time before accepting."
					.to_string(),
			});
		};
		let end = data.end_time.unwrap_or_else(|| {
			start
				+ Duration::minutes(i64::from(
					data.duration_minutes
						.unwrap_or(self.cfg.providers.calendar.default_duration_minutes),
				))
		});
		let mailbox = mailboxes::get_mailbox(&self.db.pool, current.mailbox_id).await?.ok_or_else(
			|| Error::NotFound { message: format!("Mailbox {} not found.", current.mailbox_id) },
		)?;
		let event = NewEvent {
			summary: data.title.clone(),
			start,
			end,
			location: data.location.clone().or_else(|| data.meeting_link.clone()),
			description: data.meeting_link.clone(),
			attendees: data.attendees.clone(),
		};
		let now = OffsetDateTime::now_utc();
		let hold = Duration::milliseconds(
			i64::try_from(self.cfg.providers.calendar.timeout_ms).unwrap_or(i64::MAX),
		)
		.saturating_add(ACCEPT_CLAIM_MARGIN);
		let Some(claimed_until) =
			suggestions::claim_acceptance(&self.db.pool, suggestion_id, now, now.saturating_add(hold))
				.await?
		else {
			return Err(Error::Conflict {
				message: format!(
					"Suggestion {suggestion_id} is already being accepted or is no longer pending."
				),
			});
		};
		let event_id =
			match self.providers.calendar.create_event(&mailbox.access_token, &event).await {
				Ok(event_id) => event_id,
				Err(err) => {
					suggestions::release_acceptance(&self.db.pool, suggestion_id, claimed_until)
						.await?;

					return Err(err.into());
				},
			};
		let row = suggestions::finish_acceptance(
			&self.db.pool,
			suggestion_id,
			claimed_until,
			&event_id,
			OffsetDateTime::now_utc(),
		)
		.await?;
		let Some(row) = row else {
			tracing::warn!(
				suggestion_id = %suggestion_id,
				event_id = %event_id,
				"Acceptance claim lapsed while the calendar event was created."
			);

			return Err(Error::Conflict {
				message: format!("Suggestion {suggestion_id} is no longer pending."),
			});
		};

		tracing::info!(suggestion_id = %suggestion_id, event_id = %event_id, "Suggestion accepted.");

		SuggestionView::try_from(row)
	}

	pub async fn dismiss_suggestion(&self, suggestion_id: Uuid) -> Result<SuggestionView> {
		let current = self.load_suggestion(suggestion_id).await?;

		current.status.transition(SuggestionStatus::Dismissed)?;

		let row = suggestions::resolve_pending(
			&self.db.pool,
			suggestion_id,
			SuggestionStatus::Dismissed,
			None,
			OffsetDateTime::now_utc(),
		)
		.await?
		.ok_or_else(|| Error::Conflict {
			message: format!("Suggestion {suggestion_id} is no longer pending."),
		})?;

		tracing::info!(suggestion_id = %suggestion_id, "Suggestion dismissed.");

		SuggestionView::try_from(row)
	}

	async fn load_suggestion(&self, suggestion_id: Uuid) -> Result<SuggestionView> {
		let row = suggestions::get_suggestion(&self.db.pool, suggestion_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Suggestion {suggestion_id} not found.") }
		})?;

		SuggestionView::try_from(row)
	}
}
