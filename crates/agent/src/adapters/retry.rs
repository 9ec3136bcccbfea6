//! Transport retry with exponential backoff.
//!
//! Only transient failures (provider and search errors) are retried. These
//! are transport retries; rewrites and regenerations are the loop's own
//! business retries and never pass through here.

use futures::Future;
use ragloop_core::{AppError, AppResult, LoopConfig};
use std::time::Duration;

/// Upper bound on a single backoff delay.
const MAX_DELAY_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_loop_config(config: &LoopConfig) -> Self {
        Self {
            retries: config.transport_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based): base, 2x base, 4x base, ...
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff = base_ms.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(backoff.min(MAX_DELAY_MS))
    }

    /// Run `op`, retrying transient failures.
    ///
    /// A transient failure that outlives the retries is reported as
    /// `UpstreamUnavailable` for `port`; other errors return immediately.
    pub async fn run<T, F, Fut>(&self, port: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) if attempt >= self.retries => {
                    return Err(match err {
                        AppError::UpstreamUnavailable { .. } => err,
                        other => AppError::upstream(port, other),
                    });
                }
                Err(err) => {
                    let wait = self.delay(attempt);
                    tracing::warn!(
                        port,
                        attempt = attempt + 1,
                        max_attempts = self.retries + 1,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient error, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
