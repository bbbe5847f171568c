use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionStatus {
	Pending,
	Accepted,
	Dismissed,
}
impl SuggestionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Accepted => "ACCEPTED",
			Self::Dismissed => "DISMISSED",
		}
	}

	pub fn is_terminal(self) -> bool {
		!matches!(self, Self::Pending)
	}

	/// PENDING may move to ACCEPTED or DISMISSED; terminal states never move.
	pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
		match (self, next) {
			(Self::Pending, Self::Accepted | Self::Dismissed) => Ok(next),
			_ => Err(InvalidTransition { from: self, to: next }),
		}
	}
}
impl fmt::Display for SuggestionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for SuggestionStatus {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"PENDING" => Ok(Self::Pending),
			"ACCEPTED" => Ok(Self::Accepted),
			"DISMISSED" => Ok(Self::Dismissed),
			other => Err(format!("Unknown suggestion status {other:?}.")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
	pub from: SuggestionStatus,
	pub to: SuggestionStatus,
}
impl fmt::Display for InvalidTransition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Suggestion cannot move from {} to {}.", self.from, self.to)
	}
}
impl std::error::Error for InvalidTransition {}
