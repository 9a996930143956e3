use std::future::Future;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use crate::ports::catalog::CatalogError;

/// Retry policy applied to every catalog call.
///
/// Only rate-limit responses are retried. The wait is the server's
/// `Retry-After` when given, `default_retry_after` otherwise. Once
/// `max_attempts` calls have been made, or on any other error, the call gives
/// up and yields `None` so batch callers can skip the track and move on.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            default_retry_after: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, default_retry_after: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_retry_after,
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let default_wait = self.default_retry_after;
        let backoff = ConstantBuilder::default()
            .with_delay(default_wait)
            .with_max_times(self.max_attempts.saturating_sub(1));

        let result = call
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(CatalogError::is_rate_limited)
            .adjust(move |err: &CatalogError, next: Option<Duration>| {
                // `None` means the attempts are used up
                next.map(|_| match err {
                    CatalogError::RateLimited {
                        retry_after: Some(wait),
                    } => *wait,
                    _ => default_wait,
                })
            })
            .notify(|err: &CatalogError, wait: Duration| {
                tracing::debug!("{} rate limited ({}), retrying in {:?}", operation, err, wait);
            })
            .await;

        match result {
            Ok(value) => Some(value),
            Err(e) if e.is_rate_limited() => {
                tracing::error!(
                    "{} still rate limited after {} attempts, giving up",
                    operation,
                    self.max_attempts
                );
                None
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", operation, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    fn rate_limited() -> CatalogError {
        CatalogError::RateLimited {
            retry_after: Some(Duration::ZERO),
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = policy(3)
            .run("op", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CatalogError>(7)
                }
            })
            .await;

        assert_eq!(result, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = policy(5)
            .run("op", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(rate_limited())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Option<()> = policy(4)
            .run("op", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result: Option<()> = policy(4)
            .run("op", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CatalogError::Status {
                        status: 404,
                        body: "not found".into(),
                    })
                }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
