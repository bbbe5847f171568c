mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	CalendarProviderConfig, Config, Detection, InferenceProviderConfig, Ledger, MailProviderConfig,
	MailSync, Postgres, Providers, Security, Service, Storage, Watch, Worker,
};

use std::{fs, net::SocketAddr, path::Path};

const MAX_INFERENCE_RETRIES: u32 = 10;
// Longest window in which the push provider redelivers a notification.
const MAX_LEDGER_RETENTION_HOURS: i64 = 24;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::Read { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::Parse { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.parse::<SocketAddr>().is_err() {
		return Err(Error::validation("service.http_bind must be a socket address."));
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::validation("storage.postgres.dsn must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::validation(
			"storage.postgres.pool_max_conns must be greater than zero.",
		));
	}

	validate_providers(cfg)?;

	if cfg.sync.full_resync_max_messages == 0 {
		return Err(Error::validation("sync.full_resync_max_messages must be greater than zero."));
	}
	if cfg.sync.cursor_max_age_days <= 0 {
		return Err(Error::validation("sync.cursor_max_age_days must be greater than zero."));
	}
	if cfg.sync.sync_lease_seconds <= 0 {
		return Err(Error::validation("sync.sync_lease_seconds must be greater than zero."));
	}
	if cfg.sync.max_passes == 0 {
		return Err(Error::validation("sync.max_passes must be greater than zero."));
	}
	if cfg.watch.renewal_window_hours <= 0 {
		return Err(Error::validation("watch.renewal_window_hours must be greater than zero."));
	}
	if cfg.ledger.retention_hours <= 0 {
		return Err(Error::validation("ledger.retention_hours must be greater than zero."));
	}
	if cfg.ledger.retention_hours > MAX_LEDGER_RETENTION_HOURS {
		return Err(Error::validation(format!(
			"ledger.retention_hours must be {MAX_LEDGER_RETENTION_HOURS} or less."
		)));
	}
	if cfg.detection.thread_max_messages == 0 {
		return Err(Error::validation("detection.thread_max_messages must be greater than zero."));
	}
	if cfg.detection.body_max_chars == 0 {
		return Err(Error::validation("detection.body_max_chars must be greater than zero."));
	}
	if !cfg.detection.min_confidence.is_finite()
		|| !(0.0..=1.0).contains(&cfg.detection.min_confidence)
	{
		return Err(Error::validation("detection.min_confidence must be in the range 0.0-1.0."));
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::validation("worker.poll_interval_ms must be greater than zero."));
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::validation("worker.claim_lease_seconds must be greater than zero."));
	}
	if cfg.worker.sweep_interval_seconds <= 0 {
		return Err(Error::validation("worker.sweep_interval_seconds must be greater than zero."));
	}
	if cfg.worker.max_attempts <= 0 {
		return Err(Error::validation("worker.max_attempts must be greater than zero."));
	}

	for (label, token) in [
		("security.webhook_token", &cfg.security.webhook_token),
		("security.cron_token", &cfg.security.cron_token),
	] {
		if token.trim().is_empty() {
			return Err(Error::validation(format!("{label} must be non-empty.")));
		}
	}

	Ok(())
}

fn validate_providers(cfg: &Config) -> Result<()> {
	let inference = &cfg.providers.inference;

	for (label, value) in [
		("providers.inference.api_base", &inference.api_base),
		("providers.inference.api_key", &inference.api_key),
		("providers.inference.model", &inference.model),
		("providers.mail.api_base", &cfg.providers.mail.api_base),
		("providers.mail.topic_name", &cfg.providers.mail.topic_name),
		("providers.calendar.api_base", &cfg.providers.calendar.api_base),
		("providers.calendar.calendar_id", &cfg.providers.calendar.calendar_id),
	] {
		if value.trim().is_empty() {
			return Err(Error::validation(format!("{label} must be non-empty.")));
		}
	}

	if inference.timeout_ms == 0 {
		return Err(Error::validation("providers.inference.timeout_ms must be greater than zero."));
	}
	if inference.max_retries > MAX_INFERENCE_RETRIES {
		return Err(Error::validation(format!(
			"providers.inference.max_retries must be {MAX_INFERENCE_RETRIES} or less."
		)));
	}
	if inference.base_backoff_ms == 0 {
		return Err(Error::validation(
			"providers.inference.base_backoff_ms must be greater than zero.",
		));
	}
	if !inference.temperature.is_finite() || inference.temperature < 0.0 {
		return Err(Error::validation(
			"providers.inference.temperature must be a finite number of zero or greater.",
		));
	}
	if cfg.providers.mail.timeout_ms == 0 || cfg.providers.calendar.timeout_ms == 0 {
		return Err(Error::validation("Mail and calendar timeout_ms must be greater than zero."));
	}
	if cfg.providers.calendar.default_duration_minutes == 0 {
		return Err(Error::validation(
			"providers.calendar.default_duration_minutes must be greater than zero.",
		));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}

	cfg.providers.inference.api_base =
		cfg.providers.inference.api_base.trim_end_matches('/').to_string();
	cfg.providers.mail.api_base = cfg.providers.mail.api_base.trim_end_matches('/').to_string();
	cfg.providers.calendar.api_base =
		cfg.providers.calendar.api_base.trim_end_matches('/').to_string();
}
