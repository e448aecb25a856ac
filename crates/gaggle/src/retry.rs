use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{GenerateError, GenerateResult};

/// Bounded retry with exponential backoff around provider calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after every retry.
    pub backoff_factor: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(2000),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Default::default()
        }
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delays that overflow `Duration` are capped like any other long delay.
    fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.max_delay);
        std::cmp::min(delay, self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent.
    ///
    /// Non-retryable errors are returned unchanged. Running out of retries
    /// returns [`GenerateError::RetryExhausted`] wrapping the last error.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> GenerateResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GenerateResult<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || self.max_retries == 0 {
                return Err(err);
            }
            if retry >= self.max_retries {
                return Err(GenerateError::RetryExhausted {
                    attempts: retry + 1,
                    last_error: Box::new(err),
                });
            }

            retry += 1;
            let delay = self.delay_for_retry(retry);
            warn!(
                attempt = retry + 1,
                max_attempts = self.max_retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying model call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
