//! # Retry Handler
//!
//! Bounded retries with exponential backoff around one async operation. An
//! operation runs at most `max_retries + 1` times; the delay before retry `n`
//! (0-based) is `retry_delay_ms * multiplier^n`, capped at the backoff
//! maximum. The caller gets the number of retries performed alongside the
//! final result.

use crate::config::{BackoffConfig, ExecutionConfig};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(execution: &ExecutionConfig, backoff: &BackoffConfig) -> Self {
        Self {
            max_retries: execution.max_retries,
            base_delay: execution.retry_delay(),
            multiplier: backoff.multiplier,
            max_delay: backoff.max_delay(),
        }
    }

    /// Delay before retry number `retry` (0 for the first retry)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        if capped_ms.is_finite() && capped_ms > 0.0 {
            Duration::from_millis(capped_ms as u64)
        } else {
            Duration::ZERO
        }
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    /// Retries performed after the first attempt
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct RetryHandler {
    policy: RetryPolicy,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or the retry budget is spent. The
    /// closure receives the 0-based attempt number. On exhaustion the last
    /// error is returned.
    pub async fn execute<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        retries: attempt,
                    };
                }
                Err(error) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for_retry(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %error,
                        "Operation failed, retries exhausted"
                    );
                    return RetryOutcome {
                        result: Err(error),
                        retries: attempt,
                    };
                }
            }
        }
    }
}
