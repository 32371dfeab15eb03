//! Timeouts and retries for calls that cross the network.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;

use sonority_core::{Error, Result};

use crate::config::Config;

/// Bounds every index call with a timeout and retries the ones that fail
/// with a retryable error, backing off exponentially.
///
/// Only [`Error::Unavailable`] is retried; "not found" and bad input are
/// returned on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_times: usize,
    /// Delay before the first retry; doubles after each one.
    pub min_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_times: 3,
            min_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.request_timeout(),
            max_times: config.retry_max_times,
            min_delay: Duration::from_millis(config.retry_min_delay_ms),
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub const fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_times: 0,
            min_delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_times(self.max_times)
    }

    /// Run a single attempt of `fut` under the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] on timeout, otherwise whatever `fut`
    /// returns.
    pub async fn attempt<T, Fut>(&self, what: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Unavailable(format!(
                "{what} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = *self;
        let attempt = move || {
            let fut = op();
            async move { policy.attempt(what, fut).await }
        };

        attempt
            .retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(Error::is_retryable)
            .notify(|err: &Error, delay: Duration| {
                log::warn!("{what} failed, retrying in {delay:?}: {err}");
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_times: usize) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(200),
            max_times,
            min_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_unavailable_until_success() {
        let calls = &AtomicUsize::new(0);
        let result = fast_policy(3)
            .run("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Unavailable("connection refused".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let calls = &AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .run("lookup", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::not_found("embedding", 1))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = &AtomicUsize::new(0);
        let result: Result<()> = fast_policy(2)
            .run("down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Unavailable("down".into()))
            })
            .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_becomes_unavailable() {
        let policy = RetryPolicy::no_retry(Duration::from_millis(10));
        let result: Result<()> = policy
            .attempt("slow search", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow search timed out"));
    }
}
