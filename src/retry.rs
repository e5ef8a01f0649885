//! Retry logic with bounded attempts and backoff for upstream calls.
//!
//! Absorbs transient failures of a single logical call without amplifying
//! load during a sustained outage: the attempt count is the hard bound.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// How the inter-attempt wait grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `delay * 2^(attempt - 1)`
    Exponential,
    /// `delay * attempt`
    Linear,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total allowed attempts (attempt 1 is not a retry). Minimum 1.
    pub attempts: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub delay: Duration,
    /// Backoff growth curve.
    pub backoff: BackoffKind,
    /// Ceiling for any single wait in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Add random jitter (up to +50%) to prevent synchronized retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(100),
            backoff: BackoffKind::Exponential,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Wait before the attempt following failed attempt `attempt` (1-indexed).
    ///
    /// A zero base delay means no wait between attempts.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.delay.as_millis() as u64;
        let raw = match self.backoff {
            BackoffKind::Exponential => base.saturating_mul(2u64.saturating_pow(attempt - 1)),
            BackoffKind::Linear => base.saturating_mul(attempt as u64),
        };
        let capped = raw.min(self.max_delay.as_millis() as u64);

        if self.jitter && capped > 0 {
            return Duration::from_millis(capped + fastrand::u64(0..=capped / 2));
        }

        Duration::from_millis(capped)
    }
}

/// Outcome of [`run_with_timeout`] when it does not succeed.
#[derive(Debug, PartialEq, Error)]
pub enum RetryError<E> {
    /// The timeout won the race; the retry sequence was dropped.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    /// The final attempt's error, unchanged.
    #[error("{0}")]
    Inner(E),
}

/// Attempt `operation` up to `config.attempts` times.
///
/// The closure receives the 1-indexed attempt number. The first success
/// returns immediately; the final failure is returned unchanged so callers
/// keep the root cause.
pub async fn run<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }

                let wait = config.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt,
                    attempts,
                    wait_ms = wait.as_millis() as u64,
                    "attempt failed, backing off"
                );
                if !wait.is_zero() {
                    sleep(wait).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Race the retry sequence of [`run`] against a timeout.
///
/// Whichever settles first wins. When the timeout wins, the retry future is
/// dropped, cancelling it at its next suspension point; no abandoned attempt
/// keeps running in the background.
pub async fn run_with_timeout<T, E, F, Fut>(
    config: &RetryConfig,
    timeout: Duration,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, run(config, operation)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(RetryError::Inner(err)),
        Err(_) => Err(RetryError::Timeout(timeout)),
    }
}

/// Whether an error message looks transient and worth retrying.
///
/// Callers that want retry-only-on-transient behavior can fail fast from
/// their operation closure when this returns false.
pub fn is_transient(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("reset")
        || error_lower.contains("refused")
        || error_lower.contains("unreachable")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("504")
        || error_lower.contains("429")
    {
        return true;
    }

    if error_lower.contains("400")
        || error_lower.contains("401")
        || error_lower.contains("403")
        || error_lower.contains("404")
        || error_lower.contains("422")
    {
        return false;
    }

    // Unknown errors default to retryable.
    true
}
