//! Transport retries with exponential backoff and jitter.
//!
//! Retries happen inside a single adapter attempt and only for errors the
//! adapter marked retryable (timeouts, 5xx, connection failures). They are
//! off by default: the resolver's overall deadline already bounds a
//! resolution, and moving on to the next provider is usually cheaper than
//! waiting on a struggling one.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::data_source::FetchError;

/// Backoff strategy between retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `base * factor^attempt`, capped at `max`, optionally jittered by +/- 50%.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = (base.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                let delay = Duration::from_secs_f64(seconds.max(0.0));

                if !jitter {
                    return delay;
                }
                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let spread = millis / 2;
                let offset = fastrand::u64(0..=spread.saturating_mul(2));
                Duration::from_millis((millis - spread).saturating_add(offset))
            }
        }
    }
}

/// Retry policy applied around one adapter request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryConfig {
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::default(),
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            enabled: true,
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            backoff: Backoff::default(),
        }
    }

    pub fn should_retry(&self, error: &FetchError, attempt: u32) -> bool {
        self.enabled && attempt < self.max_retries && error.retryable()
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(&error, attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
