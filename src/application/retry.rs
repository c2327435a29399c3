//! Retry decision logic for API calls.
//!
//! The policy is a pure state machine: given a response classification and
//! an attempt number it returns retry-or-stop plus the next backoff delay.
//! The async loop around it takes an injected [`Sleeper`] so the whole
//! mechanism is testable without real sleeps or network access.

use std::future::Future;
use std::time::Duration;

use crate::domain::{AppError, Result, RetryConfig};

/// Outcome category of one API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// 2xx.
    Success,
    /// 429; may carry a server-suggested delay from `Retry-After`.
    RateLimited { retry_after: Option<Duration> },
    /// 5xx, or a transport-level failure (no status).
    TransientServer { status: Option<u16> },
    /// 4xx other than 429.
    PermanentClient { status: u16 },
}

impl Classification {
    /// Whether this outcome is eligible for retrying at all.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientServer { .. })
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::RateLimited { .. } => write!(f, "rate limited (HTTP 429)"),
            Self::TransientServer { status: Some(s) } => {
                write!(f, "transient server error (HTTP {s})")
            }
            Self::TransientServer { status: None } => {
                write!(f, "transient transport error")
            }
            Self::PermanentClient { status } => {
                write!(f, "permanent client error (HTTP {status})")
            }
        }
    }
}

/// Decision produced by [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up; surface the last classification to the caller.
    Stop,
    /// Sleep for the given delay and try again.
    RetryAfter(Duration),
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    backoff_factor: f64,
    max_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_secs_f64(config.initial_backoff_seconds),
            backoff_factor: config.backoff_factor,
            max_backoff: Duration::from_secs_f64(config.max_backoff_seconds),
        }
    }

    /// Decide whether to retry after the given attempt (numbered from 0).
    ///
    /// Success and permanent client errors never retry. Retryable
    /// classifications retry while `attempt < max_retries`, with the delay
    /// growing by `backoff_factor` per attempt up to `max_backoff`. A
    /// server-suggested delay replaces the computed one when it is larger.
    #[must_use]
    pub fn decide(&self, classification: &Classification, attempt: u32) -> RetryDecision {
        if !classification.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::Stop;
        }

        let mut delay = self.backoff_delay(attempt);
        if let Classification::RateLimited {
            retry_after: Some(suggested),
        } = classification
        {
            delay = delay.max(*suggested);
        }

        RetryDecision::RetryAfter(delay)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.try_into().unwrap_or(i32::MAX));
        let delay = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Suspension point used between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// A failed attempt: the error to surface plus its classification.
#[derive(Debug)]
pub struct ClassifiedError {
    pub classification: Classification,
    pub error: AppError,
}

/// Drive `operation` through the retry policy until it succeeds or the
/// policy says stop.
///
/// The operation receives the attempt number (from 0). Retries are invisible
/// to the caller except as latency: the result is one success or one
/// terminal error. Retryable failures that exhaust the budget surface as
/// [`AppError::RetryExhausted`]; permanent failures pass through unchanged.
///
/// # Errors
/// Returns the terminal error once the policy decides `Stop`.
pub async fn run_with_retry<T, S, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &S,
    mut operation: F,
) -> Result<T>
where
    S: Sleeper,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, ClassifiedError>>,
{
    let mut attempt = 0;
    loop {
        let failure = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        match policy.decide(&failure.classification, attempt) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    classification = %failure.classification,
                    "Retrying after backoff"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::Stop => {
                let err = if failure.classification.is_retryable() {
                    AppError::RetryExhausted {
                        classification: failure.classification.to_string(),
                        attempts: attempt + 1,
                    }
                } else {
                    failure.error
                };
                return Err(err);
            }
        }
    }
}
