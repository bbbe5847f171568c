use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use crate::Result;
use parley_service::{Error as ServiceError, ParleyService};
use parley_storage::{models::ExtractionJob, outbox};

const BASE_BACKOFF_MS: i64 = 1_000;
const MAX_BACKOFF_MS: i64 = 300_000;
const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;

/// Drains the extraction outbox and runs the periodic sweeps. Never returns under normal operation.
pub async fn run_worker(service: Arc<ParleyService>) -> color_eyre::Result<()> {
	let poll = StdDuration::from_millis(service.cfg.worker.poll_interval_ms);
	let sweep_every = Duration::seconds(service.cfg.worker.sweep_interval_seconds);
	let mut last_sweep: Option<OffsetDateTime> = None;

	tracing::info!(
		poll_interval_ms = service.cfg.worker.poll_interval_ms,
		sweep_interval_seconds = service.cfg.worker.sweep_interval_seconds,
		"Worker started."
	);

	loop {
		let now = OffsetDateTime::now_utc();

		if last_sweep.is_none_or(|at| now - at >= sweep_every) {
			run_sweeps(&service, now).await;

			last_sweep = Some(now);
		}

		match process_extraction_once(&service).await {
			// Keep draining while there is work.
			Ok(true) => continue,
			Ok(false) => {},
			Err(err) => tracing::error!(error = %err, "Extraction outbox processing failed."),
		}

		tokio_time::sleep(poll).await;
	}
}

/// Claims and runs at most one job. Returns whether a job was claimed.
pub async fn process_extraction_once(service: &ParleyService) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) =
		outbox::claim_next_extraction(&service.db, now, service.cfg.worker.claim_lease_seconds)
			.await?
	else {
		return Ok(false);
	};
	let result =
		service.process_extraction(job.mailbox_id, &job.thread_id, &job.message_id).await;

	match result {
		Ok(outcome) => {
			let recorded = outbox::mark_extraction_done(
				&service.db.pool,
				job.outbox_id,
				job.available_at,
				OffsetDateTime::now_utc(),
			)
			.await?;

			if !recorded {
				claim_lost(&job);

				return Ok(true);
			}

			tracing::info!(
				outbox_id = %job.outbox_id,
				mailbox_id = %job.mailbox_id,
				thread_id = %job.thread_id,
				outcome = outcome.as_str(),
				"Extraction job finished."
			);
		},
		Err(err) => record_failure(service, &job, &err).await?,
	}

	Ok(true)
}

async fn record_failure(service: &ParleyService, job: &ExtractionJob, err: &ServiceError) -> Result<()> {
	let attempts = job.attempts.saturating_add(1);
	let error_text = sanitize_outbox_error(&err.to_string());
	let now = OffsetDateTime::now_utc();

	if gives_up(err, attempts, service.cfg.worker.max_attempts) {
		let recorded = outbox::mark_extraction_dead(
			&service.db.pool,
			job.outbox_id,
			job.available_at,
			attempts,
			&error_text,
			now,
		)
		.await?;

		if !recorded {
			claim_lost(job);

			return Ok(());
		}

		tracing::error!(
			outbox_id = %job.outbox_id,
			attempts,
			retryable = err.is_retryable(),
			error = %error_text,
			"Extraction job abandoned."
		);

		return Ok(());
	}

	let available_at = now + backoff_for_attempt(attempts);

	let recorded = outbox::mark_extraction_failed(
		&service.db.pool,
		job.outbox_id,
		job.available_at,
		attempts,
		&error_text,
		available_at,
		now,
	)
	.await?;

	if !recorded {
		claim_lost(job);

		return Ok(());
	}

	tracing::warn!(
		outbox_id = %job.outbox_id,
		attempts,
		error = %error_text,
		"Extraction job failed; retry scheduled."
	);

	Ok(())
}

fn claim_lost(job: &ExtractionJob) {
	tracing::warn!(
		outbox_id = %job.outbox_id,
		"Extraction claim expired before the result was recorded; leaving the job to its new owner."
	);
}

async fn run_sweeps(service: &ParleyService, now: OffsetDateTime) {
	if let Err(err) = service.renew_due_leases(now).await {
		tracing::error!(error = %err, "Lease renewal sweep failed.");
	}
	if let Err(err) = service.purge_notifications(now).await {
		tracing::error!(error = %err, "Notification ledger cleanup failed.");
	}

	match service.purge_finished_extractions(now).await {
		Ok(report) if report.deleted > 0 =>
			tracing::info!(deleted = report.deleted, "Finished extraction jobs purged."),
		Ok(_) => {},
		Err(err) => tracing::error!(error = %err, "Extraction outbox cleanup failed."),
	}
}

fn gives_up(err: &ServiceError, attempts: i32, max_attempts: i32) -> bool {
	!err.is_retryable() || attempts >= max_attempts
}

fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["access_token", "api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(10);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(MAX_BACKOFF_MS))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_then_caps() {
		assert_eq!(backoff_for_attempt(0), Duration::seconds(1));
		assert_eq!(backoff_for_attempt(1), Duration::seconds(1));
		assert_eq!(backoff_for_attempt(2), Duration::seconds(2));
		assert_eq!(backoff_for_attempt(4), Duration::seconds(8));
		assert_eq!(backoff_for_attempt(9), Duration::milliseconds(256_000));
		assert_eq!(backoff_for_attempt(30), Duration::milliseconds(MAX_BACKOFF_MS));
	}

	#[test]
	fn stored_errors_carry_no_credentials() {
		let sanitized = sanitize_outbox_error(
			"Provider error: HTTP 401 Authorization: Bearer ya29.secret-value access_token=abc123",
		);

		assert!(!sanitized.contains("ya29.secret-value"));
		assert!(!sanitized.contains("abc123"));
		assert!(sanitized.contains("access_token=[REDACTED]"));
		assert!(sanitized.contains("Bearer [REDACTED]"));
	}

	#[test]
	fn stored_errors_are_truncated() {
		let sanitized = sanitize_outbox_error(&"x".repeat(5_000));

		assert_eq!(sanitized.chars().count(), MAX_OUTBOX_ERROR_CHARS + 3);
		assert!(sanitized.ends_with("..."));
	}

	#[test]
	fn permanent_failures_and_exhausted_jobs_are_abandoned() {
		let transient = ServiceError::Provider { message: "503".to_string(), retryable: true };
		let permanent = ServiceError::Provider { message: "bad json".to_string(), retryable: false };

		assert!(!gives_up(&transient, 1, 5));
		assert!(gives_up(&transient, 5, 5));
		assert!(gives_up(&permanent, 1, 5));
		assert!(gives_up(&ServiceError::NotFound { message: "gone".to_string() }, 1, 5));
	}
}
