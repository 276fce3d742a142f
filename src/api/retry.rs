//! Exponential backoff for transient API failures.
//!
//! Only errors whose kind reports `is_retriable()` (transport faults and
//! rate limits) are retried; everything else is returned immediately. The
//! default schedule is deliberately short: two retries at 1s and 3s, since
//! the webhook worker has its own coarse retry schedule on top.

use std::future::Future;
use std::time::Duration;

use super::error::ApiError;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on the delay between retries.
    pub max_delay: Duration,

    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default schedule for API calls: 2 retries at 1s then 3s.
    pub const DEFAULT: Self = Self {
        max_retries: 2,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(3),
        backoff_multiplier: 3.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay for the given retry attempt (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// All retry delays in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Executes `operation`, retrying retriable failures per `config`.
///
/// Returns the first success, the first non-retriable error, or the last
/// retriable error once the schedule is exhausted.
pub async fn retry_with_backoff<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.kind.is_retriable() => return Err(e),
            Err(e) => {
                if attempt >= config.max_retries {
                    return Err(e);
                }
                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
