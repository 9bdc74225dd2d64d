//! Bounded retry with a fixed pause.
//!
//! One policy serves both retry surfaces in the engine: pipeline steps
//! (3 attempts, 1 s apart) and the proposal gate's revision loop. The
//! caller supplies the retryability predicate; the policy only counts
//! attempts and sleeps.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Result of a retried operation, with the number of attempts consumed.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub attempts: u32,
    pub result: Result<T, E>,
}

/// Fixed-pause retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    pause: Duration,
}

impl RetryPolicy {
    /// `max_attempts` includes the first try and is clamped to at least 1.
    pub fn new(max_attempts: u32, pause: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            pause,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `operation` until it succeeds, fails non-retryably, or the
    /// attempt budget runs out. The operation receives the 1-based attempt
    /// number.
    pub async fn execute<T, E, F, Fut, R>(&self, is_retryable: R, mut operation: F) -> Attempted<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    return Attempted {
                        attempts: attempt,
                        result: Ok(value),
                    }
                }
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "attempt failed, retrying after pause"
                    );
                    tokio::time::sleep(self.pause).await;
                }
                Err(err) => {
                    return Attempted {
                        attempts: attempt,
                        result: Err(err),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn returns_first_success() {
        let outcome = policy()
            .execute(|_: &String| true, |_| async { Ok::<_, String>(42) })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let outcome = policy()
            .execute(
                |_: &String| true,
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err("flaky".to_string())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
            )
            .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let outcome = policy()
            .execute(
                |err: &String| err != "fatal",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u32, _>("fatal".to_string()) }
                },
            )
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_the_attempt_budget() {
        let outcome = policy()
            .execute(
                |_: &String| true,
                |_| async { Err::<u32, _>("still failing".to_string()) },
            )
            .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap_err(), "still failing");
    }

    #[tokio::test]
    async fn attempt_budget_is_at_least_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        let outcome = policy
            .execute(|_: &String| true, |_| async { Ok::<_, String>(()) })
            .await;
        assert_eq!(outcome.attempts, 1);
    }
}
