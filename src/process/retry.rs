//! Bounded retry for recoverable failures.

use crate::constants::{RETRY_ATTEMPTS, RETRY_DELAY};
use crate::core::{DeskshipError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;

/// Fixed-interval retry applied to tool invocations and archive extraction.
///
/// Only errors for which [`DeskshipError::is_recoverable`] holds are retried
/// (a file not yet visible, a transient lock, an archive that failed
/// verification). Semantic failures return on the first attempt. When every
/// attempt fails, the error from the final attempt is returned.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RETRY_ATTEMPTS, RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Policy making up to `attempts` attempts with `delay` between them.
    #[must_use]
    pub const fn new(attempts: usize, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
        }
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    /// Run `action` until it succeeds, fails unrecoverably or runs out of attempts.
    ///
    /// `operation` names the action in log output.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let strategy = FixedInterval::new(self.delay).take(self.attempts.saturating_sub(1));
        let attempt = AtomicUsize::new(0);
        let max_attempts = self.attempts.max(1);

        RetryIf::spawn(
            strategy,
            || {
                attempt.fetch_add(1, Ordering::Relaxed);
                action()
            },
            |error: &DeskshipError| {
                let recoverable = error.is_recoverable();
                let current = attempt.load(Ordering::Relaxed);
                if recoverable && current < max_attempts {
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying: {}",
                        operation,
                        current,
                        max_attempts,
                        error
                    );
                }
                recoverable
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn transient() -> DeskshipError {
        DeskshipError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "not visible yet"))
    }

    #[tokio::test]
    async fn test_succeeds_on_second_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(5));

        let result = policy
            .run("flaky", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reports_final_error_after_all_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(5));

        let result: Result<()> = policy
            .run("always busy", || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(DeskshipError::ExternalTool {
                        tool: "ditto".into(),
                        exit_code: Some(1),
                        stdout: String::new(),
                        stderr: format!("resource busy (attempt {n})"),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert_eq!(err.captured_output(), Some("resource busy (attempt 3)"));
    }

    #[tokio::test]
    async fn test_semantic_failure_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(5));

        let result: Result<()> = policy
            .run("bad credentials", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DeskshipError::Configuration {
                        reason: "wrong password".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }
}
