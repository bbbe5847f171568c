use std::cmp::Ordering;

use time::{Duration, OffsetDateTime};

/// Orders provider cursors. Decimal tokens compare numerically; anything else falls back to
/// length-then-lexicographic order, which agrees with numeric order for unpadded digits and with
/// the SQL guard in storage.
pub fn compare(left: &str, right: &str) -> Ordering {
	match (left.parse::<u64>(), right.parse::<u64>()) {
		(Ok(left), Ok(right)) => left.cmp(&right),
		_ => left.len().cmp(&right.len()).then_with(|| left.cmp(right)),
	}
}

/// Whether writing `candidate` over `current` moves the cursor strictly forward.
pub fn advances(current: Option<&str>, candidate: &str) -> bool {
	if candidate.trim().is_empty() {
		return false;
	}

	match current {
		Some(current) => compare(candidate, current) == Ordering::Greater,
		None => true,
	}
}

/// The later of two cursors.
pub fn max<'a>(left: &'a str, right: &'a str) -> &'a str {
	if compare(left, right) == Ordering::Less { right } else { left }
}

/// History cursors are only honoured by the provider for a bounded period after they were issued.
pub fn is_fresh(cursor_updated_at: OffsetDateTime, now: OffsetDateTime, max_age_days: i64) -> bool {
	now - cursor_updated_at < Duration::days(max_age_days)
}
