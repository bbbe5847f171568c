//! Cheap keyword gate that runs before any inference call.
//!
//! Each rule contributes its weight once when it fires anywhere in the subject or body. The summed
//! score maps onto a coarse tier; only messages scoring at least [`POTENTIAL_MIN_SCORE`] are worth
//! sending to the model.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const POTENTIAL_MIN_SCORE: i32 = 2;
pub const MEDIUM_MIN_SCORE: i32 = 4;
pub const HIGH_MIN_SCORE: i32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
	Low,
	Medium,
	High,
}
impl ConfidenceTier {
	pub fn from_score(score: i32) -> Self {
		if score >= HIGH_MIN_SCORE {
			Self::High
		} else if score >= MEDIUM_MIN_SCORE {
			Self::Medium
		} else {
			Self::Low
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Low => "low",
			Self::Medium => "medium",
			Self::High => "high",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingDetectionResult {
	pub has_potential_meeting: bool,
	pub confidence_tier: ConfidenceTier,
	pub score: i32,
	/// Rule names in bank order.
	pub matched_patterns: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
	pub name: &'static str,
	pub weight: i32,
	pub pattern: &'static str,
}

pub const RULES: &[Rule] = &[
	Rule {
		name: "meeting_keyword",
		weight: 3,
		pattern: r"(?i)\b(meeting|meet up|catch[- ]up|call|interview|coffee|phone screen|video chat)\b",
	},
	Rule {
		name: "scheduling_language",
		weight: 2,
		pattern: r"(?i)\b(schedul(e|ed|ing)|availability|calendar|invite|book (a|some) time|find a time|time slot|reschedul(e|ed|ing))\b",
	},
	Rule {
		name: "proposal_phrase",
		weight: 2,
		pattern: r"(?i)(\bhow about\b|\bwould [^.?!\n]{1,40}\bwork\b|\bdoes [^.?!\n]{1,40}\bwork\b|\bare you (free|available)\b|\bcan we (do|meet|move|push|talk)\b|\blet'?s (meet|talk|chat|do|connect)\b|\bshall we\b|\bwhat about\b|\binstead\?)",
	},
	Rule {
		name: "weekday",
		weight: 2,
		pattern: r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|tues|wed|thu|thur|thurs|fri)\b",
	},
	Rule {
		name: "relative_day",
		weight: 1,
		pattern: r"(?i)\b(today|tomorrow|tonight|this week|next week|this afternoon|this morning)\b",
	},
	Rule {
		name: "clock_time",
		weight: 2,
		pattern: r"(?i)(\b\d{1,2}(:\d{2})?\s?(am|pm)\b|\b\d{1,2}:\d{2}\b|\b(noon|midday)\b)",
	},
	Rule {
		name: "calendar_date",
		weight: 1,
		pattern: r"(?i)(\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(st|nd|rd|th)?\b|\b\d{1,2}/\d{1,2}\b)",
	},
	Rule {
		name: "acceptance",
		weight: 2,
		pattern: r"(?i)(\bsounds (good|great|perfect)\b|\bworks (for me|for us|great|well|perfectly)\b|\bthat works\b|\bsee you (then|there|on|tomorrow)\b|\bconfirmed\b|\blooking forward to (it|our|the|speaking|chatting|meeting)\b|^\s*(yes|yep|yeah|sure|perfect|great)\b)",
	},
	Rule {
		name: "meeting_link",
		weight: 4,
		pattern: r"(?i)(zoom\.us/|meet\.google\.com/|teams\.microsoft\.com/|teams\.live\.com/|webex\.com/|whereby\.com/)",
	},
	Rule {
		name: "scheduling_link",
		weight: 3,
		pattern: r"(?i)(calendly\.com/|cal\.com/|savvycal\.com/)",
	},
	Rule {
		name: "bulk_mail",
		weight: -3,
		pattern: r"(?i)(\bunsubscribe\b|\bdo not reply\b|\bno-reply\b|\bview (this email )?in (your )?browser\b)",
	},
	Rule {
		name: "auto_reply",
		weight: -2,
		pattern: r"(?i)(\bout of (the )?office\b|\bautomatic reply\b|\bauto-reply\b)",
	},
];

static COMPILED: LazyLock<Vec<(Rule, Regex)>> = LazyLock::new(|| {
	RULES
		.iter()
		.filter_map(|rule| Regex::new(rule.pattern).ok().map(|regex| (*rule, regex)))
		.collect()
});

pub fn detect(subject: &str, body: &str) -> MeetingDetectionResult {
	let mut score = 0;
	let mut matched_patterns = Vec::new();

	for (rule, regex) in COMPILED.iter() {
		if regex.is_match(subject) || regex.is_match(body) {
			score += rule.weight;

			matched_patterns.push(rule.name);
		}
	}

	MeetingDetectionResult {
		has_potential_meeting: score >= POTENTIAL_MIN_SCORE,
		confidence_tier: ConfidenceTier::from_score(score),
		score,
		matched_patterns,
	}
}
