//! Bounded retry with linear, jittered backoff
//!
//! Each failed attempt sleeps `backoff + uniform(jitter_min..=jitter_max)` before
//! the next one. Non-retryable errors (see [`DatasetError::is_retryable`]) stop
//! immediately; retryable ones are wrapped in [`DatasetError::RetriesExhausted`]
//! once the attempt budget is spent.

use rand::Rng;
use std::time::Duration;

use crate::config::DownloadConfig;
use crate::error::{DatasetError, Result};

/// Attempt budget and delay between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed part of the delay
    pub backoff: Duration,
    /// Lower bound of the random part of the delay
    pub jitter_min: Duration,
    /// Upper bound of the random part of the delay
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DownloadConfig::default())
    }
}

impl From<&DownloadConfig> for RetryPolicy {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            max_attempts: config.retries.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
            jitter_min: Duration::from_secs(config.jitter_min_secs),
            jitter_max: Duration::from_secs(config.jitter_max_secs),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    /// Delay to wait before the next attempt
    pub fn delay(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.backoff + self.jitter_min;
        }

        #[allow(clippy::cast_possible_truncation)]
        let (lo, hi) = (
            self.jitter_min.as_millis() as u64,
            self.jitter_max.as_millis() as u64,
        );
        let jitter_ms = rand::thread_rng().gen_range(lo..=hi);
        self.backoff + Duration::from_millis(jitter_ms)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the budget runs out
///
/// `operation` receives the 1-based attempt number.
///
/// # Errors
/// Returns the first non-retryable error, or [`DatasetError::RetriesExhausted`]
/// carrying the last retryable one
pub fn run_with_retry<T, F>(policy: &RetryPolicy, url: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(url, attempts = attempt, "download succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(url, error = %e, "download failed with non-retryable error");
                return Err(e);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay();
                tracing::error!(
                    url,
                    attempt,
                    max_attempts,
                    error = %e,
                    "download attempt failed"
                );
                tracing::info!(delay_ms = delay.as_millis(), "retrying download");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    url,
                    attempts = attempt,
                    error = %e,
                    "download failed after all retry attempts exhausted"
                );
                return Err(DatasetError::RetriesExhausted {
                    url: url.to_owned(),
                    attempts: attempt,
                    last_error: Box::new(e),
                });
            }
        }
    }
}
