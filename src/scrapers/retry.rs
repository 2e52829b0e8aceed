//! Retry with exponential backoff.
//!
//! Delays go through a [`Sleeper`] so callers (and tests) decide how time
//! passes. After failed attempt `n` (1-based) the wait is
//! `base_delay * multiplier^n`, capped at `max_delay`; no wait follows the
//! final attempt.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Retry limits and backoff shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Ceiling for a single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Source of delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Sleeper that returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Result of [`execute_with_retry`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    /// A non-retryable error ended the loop early.
    Terminal { error: E, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { last_error: E, attempts: u32 },
}

/// Run `operation` until it succeeds, fails terminally or attempts run out.
///
/// The closure receives the 1-based attempt number.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    E: Retryable + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return RetryOutcome::Success {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) if !error.is_retryable() => {
                debug!("{} failed terminally: {}", label, error);
                return RetryOutcome::Terminal {
                    error,
                    attempts: attempt,
                };
            }
            Err(error) => {
                if attempt >= max_attempts {
                    warn!(
                        "{} failed after {} attempts: {}",
                        label, attempt, error
                    );
                    return RetryOutcome::Exhausted {
                        last_error: error,
                        attempts: attempt,
                    };
                }
                let delay = policy.delay_after(attempt);
                warn!(
                    "{} attempt {}/{} failed: {} (retrying in {:?})",
                    label, attempt, max_attempts, error, delay
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "retryable={}", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn test_default_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
        assert_eq!(policy.delay_after(2), Duration::from_secs(8));
        assert_eq!(policy.delay_after(30), policy.max_delay);
    }

    #[tokio::test]
    async fn test_exhausts_retryable_errors() {
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<(), TestError> =
            execute_with_retry(&RetryPolicy::default(), &sleeper, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { retryable: true }) }
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(4), Duration::from_secs(8)]
        );
    }

    #[tokio::test]
    async fn test_terminal_error_stops_immediately() {
        let sleeper = RecordingSleeper::new();
        let outcome: RetryOutcome<(), TestError> =
            execute_with_retry(&RetryPolicy::default(), &sleeper, "test", |_| async {
                Err(TestError { retryable: false })
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Terminal { attempts: 1, .. }));
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_succeeds_after_failure() {
        let sleeper = RecordingSleeper::new();
        let outcome = execute_with_retry(&RetryPolicy::default(), &sleeper, "test", |attempt| async move {
            if attempt < 2 {
                Err(TestError { retryable: true })
            } else {
                Ok(attempt)
            }
        })
        .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                assert_eq!(value, 2);
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sleeper.total(), Duration::from_secs(4));
    }
}
