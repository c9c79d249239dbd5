//! Exponential backoff for transient store failures.

use crate::error::StoreError;
use rand::Rng;
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// kept sync so the thread-local rng never lives across an await
fn jittered(backoff: Duration) -> Duration {
    let millis = backoff.as_millis() as u64;
    let extra = rand::thread_rng().gen_range(0..=millis / 2);
    backoff + Duration::from_millis(extra)
}

/// Runs `operation` until it succeeds, fails with a permanent error, or the
/// attempts run out.
pub async fn with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "store call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= policy.max_attempts => {
                warn!(attempt, error = %err, "giving up on store call");
                return Err(err);
            }
            Err(err) => {
                let wait = jittered(policy.backoff(attempt));
                debug!(
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "retrying store call"
                );
                sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::Error as DieselError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(20), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_backoff(&quick(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Pool("timed out".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_fail_at_once() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_backoff(&quick(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Database(DieselError::NotFound))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_backoff(&quick(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Pool("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
