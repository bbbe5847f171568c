use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
	Error, Result,
	retry::{self, RetryPolicy},
};
use parley_config::InferenceProviderConfig;

/// Chat-completions client. Every call goes through [`retry::with_backoff`] with the configured
/// policy.
#[derive(Clone)]
pub struct InferenceClient {
	cfg: InferenceProviderConfig,
	http: Client,
	policy: RetryPolicy,
}
impl InferenceClient {
	pub fn new(cfg: InferenceProviderConfig) -> Result<Self> {
		let http = crate::http_client(cfg.timeout_ms)?;
		let policy = RetryPolicy::new(cfg.max_retries, cfg.base_backoff_ms);

		Ok(Self { cfg, http, policy })
	}

	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}

	/// Returns the text content of the first choice.
	pub async fn complete(&self, messages: &[Value]) -> Result<String> {
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"messages": messages,
		});

		retry::with_backoff(self.policy, &self.cfg.provider_id, || self.send(&body)).await
	}

	/// Asks for a JSON object and returns the reply text without interpreting it.
	pub async fn complete_structured(&self, messages: &[Value]) -> Result<String> {
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"response_format": { "type": "json_object" },
			"messages": messages,
		});

		retry::with_backoff(self.policy, &self.cfg.provider_id, || self.send(&body)).await
	}

	/// Like [`Self::complete_structured`], but parses the reply into `T`. A reply that is not valid
	/// JSON for `T` fails with [`Error::MalformedJson`] carrying the raw text.
	pub async fn complete_json<T>(&self, messages: &[Value]) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let raw = self.complete_structured(messages).await?;

		parse_json_content(&raw)
	}

	async fn send(&self, body: &Value) -> Result<String> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let res = self
			.http
			.post(&url)
			.headers(crate::auth_headers(&self.cfg.api_key, &self.cfg.default_headers)?)
			.json(body)
			.send()
			.await?;
		let json: Value = crate::check_status(res).await?.json().await?;

		completion_content(&json)
	}
}

pub fn parse_json_content<T>(raw: &str) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_json::from_str(raw)
		.map_err(|err| Error::MalformedJson { message: err.to_string(), raw: raw.to_string() })
}

fn completion_content(json: &Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing choices[0].message.content.".to_string(),
		})
}
