//! Retry with backoff for outbound provider calls
//!
//! One wrapper shared by every call site. The delay schedule lives in
//! `RetryPolicy`; the actual waiting goes through a `Sleeper` so tests can
//! observe delays without waiting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// `base * n` after the n-th failure
    Linear,
    /// `base * 2^(n-1)` after the n-th failure, capped at `max`
    Exponential {
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

/// Retry policy for provider calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Base delay for backoff
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// How the delay grows
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Create a linear policy with `max_attempts` total attempts
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay = base;
        self
    }

    /// Set the backoff strategy
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Delay to wait after the `failed_attempt`-th failure (1-based)
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        let n = failed_attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(n),
            Backoff::Exponential { max } => {
                let multiplier = 2u32.saturating_pow(n - 1);
                self.base_delay.saturating_mul(multiplier).min(max)
            }
        }
    }
}

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waiting on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` until it succeeds, the error is not retryable, or the
/// policy's attempts are used up. Returns the last error in the latter cases.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= attempts || !should_retry(&e) {
                    warn!(label, attempt, error = %e, "Giving up");
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
