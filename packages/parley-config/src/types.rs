use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub sync: MailSync,
	#[serde(default)]
	pub watch: Watch,
	#[serde(default)]
	pub ledger: Ledger,
	#[serde(default)]
	pub detection: Detection,
	#[serde(default)]
	pub worker: Worker,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub inference: InferenceProviderConfig,
	pub mail: MailProviderConfig,
	pub calendar: CalendarProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	/// Retries after the first attempt for retryable failures.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Delay before the first retry; doubles on every further retry.
	#[serde(default = "default_base_backoff_ms")]
	pub base_backoff_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailProviderConfig {
	pub api_base: String,
	pub timeout_ms: u64,
	/// Fully-qualified push topic, e.g. "projects/acme/topics/gmail-push".
	pub topic_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarProviderConfig {
	pub api_base: String,
	#[serde(default = "default_calendar_id")]
	pub calendar_id: String,
	pub timeout_ms: u64,
	#[serde(default = "default_duration_minutes")]
	pub default_duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MailSync {
	pub full_resync_max_messages: u32,
	pub cursor_max_age_days: i64,
	pub sync_lease_seconds: i64,
	/// Upper bound on coalesced passes a single trigger may run.
	pub max_passes: u32,
}
impl Default for MailSync {
	fn default() -> Self {
		Self {
			full_resync_max_messages: 100,
			cursor_max_age_days: 7,
			sync_lease_seconds: 300,
			max_passes: 8,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Watch {
	pub renewal_window_hours: i64,
}
impl Default for Watch {
	fn default() -> Self {
		Self { renewal_window_hours: 24 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ledger {
	pub retention_hours: i64,
}
impl Default for Ledger {
	fn default() -> Self {
		Self { retention_hours: 24 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Detection {
	pub thread_max_messages: u32,
	pub body_max_chars: u32,
	pub min_confidence: f32,
}
impl Default for Detection {
	fn default() -> Self {
		Self { thread_max_messages: 10, body_max_chars: 2_000, min_confidence: 0.5 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub sweep_interval_seconds: i64,
	pub max_attempts: i32,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: 500,
			claim_lease_seconds: 120,
			sweep_interval_seconds: 3_600,
			max_attempts: 5,
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub webhook_token: String,
	pub cron_token: String,
	pub api_auth_token: Option<String>,
}

fn default_max_retries() -> u32 {
	3
}

fn default_base_backoff_ms() -> u64 {
	500
}

fn default_calendar_id() -> String {
	"primary".to_string()
}

fn default_duration_minutes() -> u32 {
	30
}
