use std::{future::Future, time::Duration};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries after the first attempt.
	pub max_retries: u32,
	pub base_delay: Duration,
}
impl RetryPolicy {
	pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
		Self { max_retries, base_delay: Duration::from_millis(base_delay_ms) }
	}

	/// Delay before retry number `retry` (zero-based): `base * 2^retry`.
	pub fn delay_for(&self, retry: u32) -> Duration {
		self.base_delay.saturating_mul(2_u32.saturating_pow(retry.min(16)))
	}
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the retry budget is spent.
/// The last error is returned unchanged.
pub async fn with_backoff<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut retry = 0;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) if err.is_retryable() && retry < policy.max_retries => {
				let delay = policy.delay_for(retry);

				tracing::warn!(
					provider = label,
					retry = retry + 1,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Provider call failed. Retrying."
				);
				tokio::time::sleep(delay).await;

				retry += 1;
			},
			Err(err) => return Err(err),
		}
	}
}
