//! Bounded retry with exponential backoff.
//!
//! Every attempt is bounded by `attempt_timeout_ms`, the whole loop by an
//! optional `deadline_ms`. Delays double from `base_delay_ms` up to
//! `max_delay_ms`.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{DeliveryError, Result};

/// Retry configuration for publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up (at least one is always made).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay_ms: u64,
    /// Cap on any single delay.
    pub max_delay_ms: u64,
    /// Upper bound on a single attempt.
    pub attempt_timeout_ms: u64,
    /// Upper bound on the whole retry loop, if any.
    pub deadline_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            attempt_timeout_ms: 5_000,
            deadline_ms: Some(20_000),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Run `operation` until it succeeds, attempts run out, or the deadline
    /// passes. On success returns the value and the attempt that produced
    /// it. An error that is not recoverable is returned without retrying.
    ///
    /// The operation receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<(T, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempt_timeout = Duration::from_millis(self.attempt_timeout_ms);
        let deadline = self
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let budget = match deadline {
                Some(deadline) => {
                    attempt_timeout.min(deadline.saturating_duration_since(Instant::now()))
                }
                None => attempt_timeout,
            };
            if budget.is_zero() {
                return Err(DeliveryError::Timeout {
                    attempts: attempt - 1,
                });
            }

            match tokio::time::timeout(budget, operation(attempt)).await {
                Ok(Ok(value)) => return Ok((value, attempt)),
                Ok(Err(e)) if !e.is_recoverable() => {
                    debug!(attempt, error = %e, "attempt failed, not retrying");
                    return Err(e);
                }
                Ok(Err(e)) => {
                    debug!(attempt, error = %e, "attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    debug!(attempt, "attempt timed out");
                    last_error = format!("attempt timed out after {:?}", budget);
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(DeliveryError::Timeout { attempts: attempt });
                }
            }

            if attempt == max_attempts {
                break;
            }

            let delay = self.backoff_delay(attempt);
            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    return Err(DeliveryError::Timeout { attempts: attempt });
                }
            }
            tokio::time::sleep(delay).await;
        }

        Err(DeliveryError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

/// What happened to a publish. Failure is reported, never fatal.
#[derive(Debug)]
pub enum PublishOutcome {
    /// The transport accepted the payload.
    Delivered { attempts: u32 },
    /// The transport never accepted the payload.
    Failed { attempts: u32, error: DeliveryError },
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PublishOutcome::Delivered { attempts } | PublishOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, deadline_ms: Option<u64>) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            attempt_timeout_ms: 500,
            deadline_ms,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(10, None);
        assert_eq!(p.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(p.backoff_delay(5), Duration::from_millis(1_000));
        assert_eq!(p.backoff_delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_policy_from_partial_json() {
        let p: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(p.max_attempts, 2);
        assert_eq!(p.base_delay_ms, RetryPolicy::default().base_delay_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let (value, attempts) = policy(4, None)
            .run(|_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DeliveryError::Transport("flaky".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(attempts, 3);
        // 100ms + 200ms of backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let err = policy(3, None)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DeliveryError::Transport("down".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let err = policy(5, None)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DeliveryError::Unsupported("history".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Unsupported(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_makes_one_attempt() {
        let calls = AtomicU32::new(0);

        let err = RetryPolicy::no_retry()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DeliveryError::Transport("down".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempts_time_out() {
        let started = Instant::now();

        let err = policy(2, None)
            .run(|_| std::future::pending::<Result<()>>())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Exhausted { attempts: 2, .. }));
        // Two 500ms attempts plus one 100ms backoff.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1_100));
        assert!(elapsed < Duration::from_millis(1_200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_loop() {
        let started = Instant::now();

        let err = policy(100, Some(1_200))
            .run(|_| std::future::pending::<Result<()>>())
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Timeout { .. }));
        assert!(started.elapsed() <= Duration::from_millis(1_200));
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            base in 1u64..10_000,
            cap in 1u64..100_000,
            attempt in 1u32..64,
        ) {
            let p = RetryPolicy {
                base_delay_ms: base,
                max_delay_ms: cap,
                ..RetryPolicy::default()
            };
            let this = p.backoff_delay(attempt);
            let next = p.backoff_delay(attempt + 1);
            prop_assert!(this <= next);
            prop_assert!(next <= Duration::from_millis(cap));
        }
    }
}
