//! Exponential backoff retry policy
//!
//! [`RetryPolicy::run`] wraps any async operation. The delay after failed
//! attempt `k` (0-based) is `base_delay * 2^k`: with the defaults that is
//! 1s then 2s before the third and final attempt.
//!
//! Every error except [`SyncError::Cancelled`] is retried. Timeouts are the
//! adapters' concern; this policy only owns the attempt count and the delay.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drivemirror_core::config::TransferConfig;

use crate::SyncError;

/// Default number of attempts per operation
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the exponent so the delay cannot overflow
const MAX_EXPONENT: u32 = 16;

/// Retry strategy with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after the failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(MAX_EXPONENT))
    }

    /// Runs `operation` until it succeeds, attempts are exhausted, or
    /// `cancel` fires
    ///
    /// Exhaustion returns the error of the last attempt. Cancellation, either
    /// returned by the operation or observed during a backoff sleep, returns
    /// [`SyncError::Cancelled`] immediately.
    pub async fn run<F, Fut, T>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) if attempt + 1 >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
