//! Remote call policy: timeout and bounded retry.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::error::{RemoteError, RemoteResult};

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Exponential backoff between attempts of one remote operation.
///
/// `max_attempts = 1` means a failed operation is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1 for the first retry)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for a single remote call
    pub remote_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    /// Run `call` under the timeout, retrying failures per the retry policy.
    pub(crate) async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = timeout(self.remote_timeout, call())
                .await
                .unwrap_or_else(|_| Err(RemoteError::Timeout(self.remote_timeout)));
            match result {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        "Remote {label} failed (attempt {attempt}/{max_attempts}), retrying in {delay:?}: {error}"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(30), Duration::from_millis(350));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn default_policy_tries_once() {
        let calls = &AtomicU32::new(0);
        let result: RemoteResult<()> = SyncOptions::default()
            .run("upsert", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Api("down".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_until_success() {
        let options = SyncOptions {
            remote_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(5),
            },
        };
        let calls = &AtomicU32::new(0);
        let result = options
            .run("upsert", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::Api("flaky".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_call_times_out() {
        let options = SyncOptions {
            remote_timeout: Duration::from_millis(20),
            ..SyncOptions::default()
        };
        let result: RemoteResult<()> = options
            .run("fetch", || async {
                sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RemoteError::Timeout(_))));
    }
}
