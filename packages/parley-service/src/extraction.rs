//! Runs the meeting pipeline for one received message and stores the suggestion.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, ParleyService, Result,
	calendar_parser::{self, ParserSettings},
};
use parley_domain::thread::{Direction, ThreadMessage};
use parley_storage::{
	mailboxes, messages,
	models::MailMessage,
	suggestions::{self, NewSuggestion},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
	/// The thread already has a suggestion in some status.
	AlreadySuggested,
	/// The pre-filter found no meeting signal.
	Skipped,
	NotConfirmed,
	/// Confirmed, but below the configured confidence floor.
	LowConfidence,
	Created { suggestion_id: Uuid },
}
impl ExtractionOutcome {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::AlreadySuggested => "already_suggested",
			Self::Skipped => "skipped",
			Self::NotConfirmed => "not_confirmed",
			Self::LowConfidence => "low_confidence",
			Self::Created { .. } => "created",
		}
	}
}

impl ParleyService {
	pub async fn process_extraction(
		&self,
		mailbox_id: Uuid,
		thread_id: &str,
		message_id: &str,
	) -> Result<ExtractionOutcome> {
		// A thread is suggested at most once, so skip the model call entirely.
		if suggestions::suggestion_exists(&self.db.pool, mailbox_id, thread_id).await? {
			return Ok(ExtractionOutcome::AlreadySuggested);
		}

		let mailbox = mailboxes::get_mailbox(&self.db.pool, mailbox_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Mailbox {mailbox_id} not found.") })?;
		let stored = messages::thread_messages(&self.db.pool, mailbox_id, thread_id).await?;
		let Some(trigger_index) = stored.iter().position(|m| m.message_id == message_id) else {
			return Err(Error::NotFound {
				message: format!("Message {message_id} not found in thread {thread_id}."),
			});
		};
		let thread = stored[..=trigger_index]
			.iter()
			.map(to_thread_message)
			.collect::<Result<Vec<_>>>()?;
		let trigger = &thread[trigger_index];
		let settings = ParserSettings::from_config(&self.cfg);
		let outcome = calendar_parser::parse_thread(
			self.providers.inference.as_ref(),
			&settings,
			&mailbox.email_address,
			&thread,
			trigger,
		)
		.await?;

		if outcome.skipped {
			return Ok(ExtractionOutcome::Skipped);
		}

		let Some(data) = outcome.data.filter(|_| outcome.is_confirmed) else {
			return Ok(ExtractionOutcome::NotConfirmed);
		};

		if data.confidence < self.cfg.detection.min_confidence {
			tracing::info!(
				mailbox_id = %mailbox_id,
				thread_id,
				confidence = data.confidence,
				"Confirmed meeting below confidence floor; no suggestion stored."
			);

			return Ok(ExtractionOutcome::LowConfidence);
		}

		let new = NewSuggestion {
			mailbox_id,
			thread_id,
			source_message_id: message_id,
			extracted_data: serde_json::to_value(&data).map_err(|err| Error::InvalidRequest {
				message: format!("Failed to encode meeting data: {err}."),
			})?,
			confidence: data.confidence,
		};
		let created =
			suggestions::create_if_absent(&self.db.pool, &new, OffsetDateTime::now_utc()).await?;

		Ok(match created {
			Some(row) => {
				tracing::info!(
					mailbox_id = %mailbox_id,
					thread_id,
					suggestion_id = %row.suggestion_id,
					tier = outcome.detection.confidence_tier.as_str(),
					"Meeting suggestion created."
				);

				ExtractionOutcome::Created { suggestion_id: row.suggestion_id }
			},
			None => ExtractionOutcome::AlreadySuggested,
		})
	}
}

fn to_thread_message(row: &MailMessage) -> Result<ThreadMessage> {
	let direction =
		row.direction.parse::<Direction>().map_err(|message| Error::Storage { message })?;

	Ok(ThreadMessage {
		message_id: row.message_id.clone(),
		direction,
		sender: row.sender.clone(),
		subject: row.subject.clone(),
		body_text: row.body_text.clone(),
		sent_at: row.received_at,
	})
}
