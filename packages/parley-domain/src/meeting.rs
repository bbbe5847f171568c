use serde::{Deserialize, Serialize};
use time::{
	Duration, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
	macros::format_description,
};

pub const DEFAULT_TITLE: &str = "Meeting";

/// Meeting fields exactly as the model returned them. Everything is optional so that a sloppy but
/// well-formed answer still parses; [`ExtractedMeetingData::from_extracted`] decides what survives.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractedMeeting {
	pub title: Option<String>,
	pub start_time: Option<String>,
	pub end_time: Option<String>,
	pub duration_minutes: Option<u32>,
	pub location: Option<String>,
	pub attendees: Option<Vec<String>>,
	pub meeting_link: Option<String>,
	pub platform: Option<String>,
	pub confidence: Option<f32>,
	pub needs_time_confirmation: Option<bool>,
	pub ambiguities: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMeetingData {
	pub title: String,
	#[serde(default, with = "crate::rfc3339::option")]
	pub start_time: Option<OffsetDateTime>,
	#[serde(default, with = "crate::rfc3339::option")]
	pub end_time: Option<OffsetDateTime>,
	pub duration_minutes: Option<u32>,
	pub location: Option<String>,
	#[serde(default)]
	pub attendees: Vec<String>,
	pub meeting_link: Option<String>,
	pub platform: Option<String>,
	pub confidence: f32,
	pub needs_time_confirmation: bool,
	#[serde(default)]
	pub ambiguities: Vec<String>,
}
impl ExtractedMeetingData {
	pub fn from_extracted(raw: ExtractedMeeting, default_duration_minutes: u32) -> Self {
		let mut ambiguities: Vec<String> = raw
			.ambiguities
			.unwrap_or_default()
			.into_iter()
			.map(|note| note.trim().to_string())
			.filter(|note| !note.is_empty())
			.collect();
		let start_time = raw
			.start_time
			.as_deref()
			.and_then(|value| parse_time("start_time", value, &mut ambiguities));
		let mut end_time = raw
			.end_time
			.as_deref()
			.and_then(|value| parse_time("end_time", value, &mut ambiguities));

		if let (Some(start), Some(end)) = (start_time, end_time)
			&& end <= start
		{
			ambiguities.push("end_time was not after start_time and was discarded.".to_string());

			end_time = None;
		}

		let mut duration_minutes = raw.duration_minutes.filter(|minutes| *minutes > 0);

		match (start_time, end_time, duration_minutes) {
			(Some(start), Some(end), None) => {
				duration_minutes = u32::try_from((end - start).whole_minutes()).ok();
			},
			(Some(start), None, Some(minutes)) => {
				end_time = Some(start + Duration::minutes(i64::from(minutes)));
			},
			(Some(start), None, None) => {
				ambiguities.push(format!(
					"Duration not stated; assumed {default_duration_minutes} minutes."
				));

				duration_minutes = Some(default_duration_minutes);
				end_time = Some(start + Duration::minutes(i64::from(default_duration_minutes)));
			},
			_ => {},
		}

		let meeting_link = non_empty(raw.meeting_link);
		let platform = non_empty(raw.platform)
			.map(|platform| platform.to_lowercase().replace([' ', '-'], "_"))
			.or_else(|| meeting_link.as_deref().and_then(infer_platform).map(str::to_string));

		Self {
			title: non_empty(raw.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
			needs_time_confirmation: raw.needs_time_confirmation.unwrap_or(false)
				|| start_time.is_none(),
			start_time,
			end_time,
			duration_minutes,
			location: non_empty(raw.location),
			attendees: dedupe_attendees(raw.attendees.unwrap_or_default()),
			meeting_link,
			platform,
			confidence: clamp_confidence(raw.confidence.unwrap_or(0.0)),
			ambiguities,
		}
	}
}

pub fn infer_platform(link: &str) -> Option<&'static str> {
	let lowered = link.to_ascii_lowercase();

	if lowered.contains("zoom.us/") {
		Some("zoom")
	} else if lowered.contains("meet.google.com/") {
		Some("google_meet")
	} else if lowered.contains("teams.microsoft.com/") || lowered.contains("teams.live.com/") {
		Some("microsoft_teams")
	} else if lowered.contains("webex.com/") {
		Some("webex")
	} else {
		None
	}
}

pub fn clamp_confidence(value: f32) -> f32 {
	if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn parse_time(label: &str, raw: &str, ambiguities: &mut Vec<String>) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	if raw.is_empty() {
		return None;
	}
	if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(parsed);
	}

	let naive = PrimitiveDateTime::parse(
		raw,
		format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
	)
	.or_else(|_| {
		PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]"))
	})
	.or_else(|_| {
		PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]"))
	});

	match naive {
		Ok(naive) => {
			ambiguities.push(format!("{label} had no UTC offset; assumed UTC."));

			Some(naive.assume_utc())
		},
		Err(_) => {
			ambiguities.push(format!("{label} {raw:?} could not be parsed."));

			None
		},
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn dedupe_attendees(attendees: Vec<String>) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(attendees.len());

	for attendee in attendees {
		let attendee = attendee.trim();

		if attendee.is_empty() || out.iter().any(|seen| seen.eq_ignore_ascii_case(attendee)) {
			continue;
		}

		out.push(attendee.to_string());
	}

	out
}
