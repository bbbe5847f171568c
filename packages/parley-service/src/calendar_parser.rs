//! Decides whether a thread contains a mutually confirmed meeting and extracts it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;

use crate::{Error, InferenceProvider, Result};
use parley_domain::{
	meeting::{ExtractedMeeting, ExtractedMeetingData},
	prefilter::{self, MeetingDetectionResult},
	thread::{self, ThreadMessage},
};
use parley_providers::inference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserSettings {
	pub thread_max_messages: usize,
	pub body_max_chars: usize,
	pub default_duration_minutes: u32,
}
impl ParserSettings {
	pub fn from_config(cfg: &parley_config::Config) -> Self {
		Self {
			thread_max_messages: cfg.detection.thread_max_messages as usize,
			body_max_chars: cfg.detection.body_max_chars as usize,
			default_duration_minutes: cfg.providers.calendar.default_duration_minutes,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
	/// The triggering message showed no meeting signal; inference was not called.
	pub skipped: bool,
	pub detection: MeetingDetectionResult,
	pub is_confirmed: bool,
	pub data: Option<ExtractedMeetingData>,
}
impl ParseOutcome {
	fn unconfirmed(detection: MeetingDetectionResult, skipped: bool) -> Self {
		Self { skipped, detection, is_confirmed: false, data: None }
	}
}

#[derive(Debug, Deserialize)]
struct Verdict {
	is_confirmed: bool,
	#[serde(default)]
	meeting: Option<ExtractedMeeting>,
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
	index: usize,
	direction: &'static str,
	from: &'a str,
	sent_at: String,
	subject: &'a str,
	body: &'a str,
	is_latest: bool,
}

/// `thread` is every known message of the conversation up to and including `trigger`.
pub async fn parse_thread(
	provider: &dyn InferenceProvider,
	settings: &ParserSettings,
	owner_address: &str,
	thread: &[ThreadMessage],
	trigger: &ThreadMessage,
) -> Result<ParseOutcome> {
	let detection =
		prefilter::detect(&trigger.subject, &thread::strip_quoted(&trigger.body_text));

	if !detection.has_potential_meeting {
		return Ok(ParseOutcome::unconfirmed(detection, true));
	}

	let window =
		thread::context_window(thread, settings.thread_max_messages, settings.body_max_chars);

	// Confirmation needs an earlier message to answer.
	if window.len() < 2 {
		return Ok(ParseOutcome::unconfirmed(detection, false));
	}

	let messages = build_messages(owner_address, &window, &trigger.message_id, &detection)?;
	let raw = provider.complete_structured(&messages).await?;
	let verdict: Verdict = inference::parse_json_content(&raw)?;

	if !verdict.is_confirmed {
		return Ok(ParseOutcome::unconfirmed(detection, false));
	}

	let Some(meeting) = verdict.meeting else {
		return Err(Error::Provider {
			message: "Model confirmed a meeting without meeting details.".to_string(),
			retryable: false,
		});
	};
	let data = ExtractedMeetingData::from_extracted(meeting, settings.default_duration_minutes);

	Ok(ParseOutcome { skipped: false, detection, is_confirmed: true, data: Some(data) })
}

fn build_messages(
	owner_address: &str,
	window: &[ThreadMessage],
	trigger_id: &str,
	detection: &MeetingDetectionResult,
) -> Result<Vec<Value>> {
	let schema = serde_json::json!({
		"is_confirmed": "boolean",
		"meeting": {
			"title": "string|null",
			"start_time": "RFC3339 timestamp with offset|null",
			"end_time": "RFC3339 timestamp with offset|null",
			"duration_minutes": "number|null",
			"location": "string|null",
			"attendees": "string[]",
			"meeting_link": "string|null",
			"platform": "zoom|google_meet|microsoft_teams|webex|phone|in_person|null",
			"confidence": 0.0,
			"needs_time_confirmation": "boolean",
			"ambiguities": "string[]"
		}
	});
	let system_prompt = "You read an email thread and decide whether both sides have agreed on a \
specific meeting. Output must be valid JSON only and must match the provided schema exactly. \
A proposal that has not been answered is not a confirmation. \
A short affirmative reply such as \"sounds good\" or \"yes, that works\" to an earlier concrete \
proposal is a confirmation of that proposal. \
When a time was re-negotiated, report the final time both sides agreed on, not the first one \
proposed. \
Resolve relative dates such as \"Tuesday\" or \"tomorrow\" against the sent_at of the message \
that used them and keep that message's timezone when one is known. \
If the date or time cannot be pinned down, set needs_time_confirmation to true and explain in \
ambiguities. \
Set meeting to null when is_confirmed is false.";
	let mut prompt_messages = Vec::with_capacity(window.len());

	for (index, message) in window.iter().enumerate() {
		let sent_at = message.sent_at.format(&Rfc3339).map_err(|err| Error::InvalidRequest {
			message: format!("Message {} has an unformattable timestamp: {err}.", message.message_id),
		})?;

		prompt_messages.push(PromptMessage {
			index,
			direction: message.direction.as_str(),
			from: &message.sender,
			sent_at,
			subject: &message.subject,
			body: &message.body_text,
			is_latest: message.message_id == trigger_id,
		});
	}

	let messages_json = serde_json::to_string(&prompt_messages).map_err(|_| {
		Error::InvalidRequest { message: "Failed to serialize thread for the parser.".to_string() }
	})?;
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema}\nThe mailbox owner is {owner_address}; \
SENT messages are from the owner and RECEIVED messages are from the other side.\n\
Signals found in the latest message: {}.\n\
Here is the thread, oldest first, as JSON:\n{messages_json}",
		detection.matched_patterns.join(", ")
	);

	Ok(vec![
		serde_json::json!({ "role": "system", "content": system_prompt }),
		serde_json::json!({ "role": "user", "content": user_prompt }),
	])
}
