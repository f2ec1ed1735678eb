//! Retry utilities with randomized exponential backoff.

use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Configuration for retry behavior.
///
/// Leaving both `max_attempts` and `max_elapsed` unset retries forever.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: Option<u32>,
    /// Lower bound of every wait.
    pub min_delay: Duration,
    /// Upper bound of every wait.
    pub max_delay: Duration,
    /// Scale of the exponential upper bound (`multiplier * 2^(attempt-1)` seconds).
    pub multiplier: f64,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            multiplier: 1.0,
            max_elapsed: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration bounded to `max_attempts`.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Default::default()
        }
    }

    /// Retry until success, however long that takes.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            ..Default::default()
        }
    }

    /// Set the minimum delay.
    #[must_use]
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set an overall deadline for all attempts.
    #[must_use]
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }

    /// Randomized wait before the attempt following `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64().max(min);
        let exp = self.multiplier * 2f64.powi(attempt.saturating_sub(1).min(62) as i32);
        let upper = exp.clamp(min, max);
        if upper <= min {
            return Duration::from_secs_f64(min);
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(min..=upper))
    }

    fn exhausted(&self, attempts: u32, started: Instant) -> bool {
        if let Some(max) = self.max_attempts
            && attempts >= max
        {
            return true;
        }
        self.max_elapsed
            .is_some_and(|deadline| started.elapsed() >= deadline)
    }
}

/// Retry result indicating what happened.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed after all retries, or with a non-retryable error.
    Failed { last_error: E, attempts: u32 },
}

impl<T, E: Retryable> RetryResult<T, E> {
    /// Convert to a Result, discarding retry information.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }

    /// Convert to a Result, wrapping a retryable error that ran out of
    /// attempts with `exhausted`. Non-retryable errors pass through as-is.
    pub fn into_result_or(self, exhausted: impl FnOnce(E, u32) -> E) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed {
                last_error,
                attempts,
            } if last_error.is_retryable() => Err(exhausted(last_error, attempts)),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }
}

/// Determines if an error is retryable.
pub trait Retryable {
    /// Returns true if the operation should be retried.
    fn is_retryable(&self) -> bool;
}

/// Execute an async operation with randomized exponential backoff.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => {
                if !error.is_retryable() || config.exhausted(attempts, started) {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                let delay = config.backoff_delay(attempts);
                tracing::warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after failure"
                );
                sleep(delay).await;
            }
        }
    }
}
