use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
	Sent,
	Received,
}
impl Direction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Sent => "SENT",
			Self::Received => "RECEIVED",
		}
	}
}
impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for Direction {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"SENT" => Ok(Self::Sent),
			"RECEIVED" => Ok(Self::Received),
			other => Err(format!("Unknown message direction {other:?}.")),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
	pub message_id: String,
	pub direction: Direction,
	pub sender: String,
	pub subject: String,
	pub body_text: String,
	pub sent_at: OffsetDateTime,
}

/// Bounds what a thread contributes to one inference request: quoted history is stripped, each
/// body is capped at `body_max_chars`, and only the newest `max_messages` survive.
pub fn context_window(
	messages: &[ThreadMessage],
	max_messages: usize,
	body_max_chars: usize,
) -> Vec<ThreadMessage> {
	let mut ordered = messages.to_vec();

	ordered.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.message_id.cmp(&b.message_id)));

	let skip = ordered.len().saturating_sub(max_messages);

	ordered
		.into_iter()
		.skip(skip)
		.map(|mut message| {
			message.body_text = truncate_chars(&strip_quoted(&message.body_text), body_max_chars);

			message
		})
		.collect()
}

/// Drops reply quoting: `>` lines and everything from an "On ... wrote:" header onward.
pub fn strip_quoted(body: &str) -> String {
	let mut kept = Vec::new();

	for line in body.lines() {
		let trimmed = line.trim();

		if is_reply_header(trimmed) || trimmed == "-----Original Message-----" {
			break;
		}
		if trimmed.starts_with('>') {
			continue;
		}

		kept.push(line);
	}

	kept.join("\n").trim().to_string()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((idx, _)) => text[..idx].to_string(),
		None => text.to_string(),
	}
}

fn is_reply_header(line: &str) -> bool {
	line.starts_with("On ") && line.ends_with("wrote:")
}
