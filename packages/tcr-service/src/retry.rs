use std::{future::Future, time::Duration};

use crate::{Error, Result};

/// Bounded exponential backoff for idempotent upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl RetryPolicy {
	pub fn for_search(cfg: &tcr_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			base_backoff_ms: cfg.base_backoff_ms,
			max_backoff_ms: cfg.max_backoff_ms,
		}
	}

	pub fn for_jobs(cfg: &tcr_config::Jobs) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			base_backoff_ms: cfg.base_backoff_ms,
			max_backoff_ms: cfg.max_backoff_ms,
		}
	}

	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(6);
		let base = self.base_backoff_ms.saturating_mul(1 << exp);

		Duration::from_millis(base.min(self.max_backoff_ms))
	}

	/// Provider-requested delays win over the computed backoff.
	pub fn delay_for(&self, attempt: u32, err: &Error) -> Duration {
		err.retry_after().unwrap_or_else(|| self.backoff_for_attempt(attempt))
	}

	pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut attempt = 1;

		loop {
			match call().await {
				Ok(value) => return Ok(value),
				Err(err) if err.is_retryable() && attempt < max_attempts => {
					let delay = self.delay_for(attempt, &err);

					tracing::warn!(
						error = %err,
						operation,
						attempt,
						delay_ms = delay.as_millis() as u64,
						"Upstream call failed. Retrying."
					);
					tokio::time::sleep(delay).await;

					attempt += 1;
				},
				Err(err) => return Err(err),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy { max_attempts: 3, base_backoff_ms: 100, max_backoff_ms: 250 }
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = policy();

		assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(100));
		assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(200));
		assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(250));
		assert_eq!(policy.backoff_for_attempt(40), Duration::from_millis(250));
	}

	#[test]
	fn rate_limit_delay_overrides_backoff() {
		let err = Error::RateLimited { message: "slow".to_string(), retry_after_ms: Some(1_500) };

		assert_eq!(policy().delay_for(1, &err), Duration::from_millis(1_500));
	}

	#[tokio::test(start_paused = true)]
	async fn retries_transient_failures_until_success() {
		let calls = AtomicU32::new(0);
		let value = policy()
			.run("test", || async {
				if calls.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(Error::UpstreamUnavailable { message: "down".to_string() })
				} else {
					Ok(7)
				}
			})
			.await
			.expect("Expected eventual success.");

		assert_eq!(value, 7);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn validation_errors_are_not_retried() {
		let calls = AtomicU32::new(0);
		let result: Result<()> = policy()
			.run("test", || async {
				calls.fetch_add(1, Ordering::SeqCst);

				Err(Error::Validation { message: "bad".to_string() })
			})
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn rejected_provider_calls_run_once() {
		let calls = AtomicU32::new(0);
		let result: Result<()> = policy()
			.run("test", || async {
				calls.fetch_add(1, Ordering::SeqCst);

				Err(tcr_providers::Error::Rejected { status: 401 }.into())
			})
			.await;

		assert!(matches!(result, Err(Error::UpstreamRejected { .. })));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
