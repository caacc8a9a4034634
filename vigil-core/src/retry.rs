//! Retry logic for transient probe failures.
//!
//! Probes that talk to the network wrap their in-process attempts in a
//! [`RetryExecutor`]. The policy decides how many attempts are made and how
//! long to wait between them.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, VigilError};

/// Attempt count and the fixed pause between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// A policy with `attempts` tries separated by a constant `delay`.
    pub fn fixed(attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: attempts.max(1),
            delay,
        }
    }
}

/// Whether an error is worth another attempt.
///
/// Timeouts, refused/reset connections, DNS hiccups and 5xx/429 responses
/// are retried. Invalid input, certificate problems and parse failures are
/// returned immediately.
pub fn is_transient(error: &VigilError) -> bool {
    match error {
        VigilError::Timeout(_) => true,
        VigilError::Io(_) => true,
        VigilError::Reqwest(e) => is_transient_reqwest_error(e),
        VigilError::Http(msg) | VigilError::Whois(msg) => {
            let lower = msg.to_lowercase();
            lower.contains("connect")
                || lower.contains("timed out")
                || lower.contains("timeout")
                || lower.contains("refused")
                || lower.contains("reset")
                || lower.contains("dns")
        }

        VigilError::InvalidDomain(_)
        | VigilError::Certificate(_)
        | VigilError::Command(_)
        | VigilError::Store(_)
        | VigilError::Json(_)
        | VigilError::Config(_)
        | VigilError::RetryExhausted { .. }
        | VigilError::Other(_) => false,
    }
}

fn is_transient_reqwest_error(error: &reqwest::Error) -> bool {
    if error.is_connect() || error.is_timeout() {
        return true;
    }

    if let Some(status) = error.status() {
        return status.as_u16() == 429 || status.is_server_error();
    }

    if error.is_builder() || error.is_body() || error.is_decode() {
        return false;
    }

    // Redirect loops, TLS and protocol errors. Some hosts reset the first
    // handshake.
    true
}

/// Runs an async operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Calls `operation` until it succeeds, fails with a non-transient
    /// error, or the attempt budget is spent.
    ///
    /// When more than one attempt was made the final error is wrapped in
    /// [`VigilError::RetryExhausted`].
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let remaining = self.policy.max_attempts.saturating_sub(attempt + 1);
            if remaining == 0 || !is_transient(&error) {
                if attempt == 0 {
                    return Err(error);
                }
                warn!(
                    attempts = attempt + 1,
                    error = %error,
                    "Operation failed after retries"
                );
                return Err(VigilError::RetryExhausted {
                    attempts: attempt + 1,
                    last_error: error.to_string(),
                });
            }

            debug!(
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                delay_ms = self.policy.delay.as_millis() as u64,
                error = %error,
                "Retrying after transient error"
            );
            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy_is_three_attempts_one_second_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient(&VigilError::Timeout("t".into())));
        assert!(is_transient(&VigilError::Http("connection refused".into())));
        assert!(!is_transient(&VigilError::Http("bad header".into())));
        assert!(!is_transient(&VigilError::InvalidDomain("x".into())));
        assert!(!is_transient(&VigilError::Certificate("expired".into())));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<u16> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(VigilError::Timeout("slow".into()))
                    } else {
                        Ok(200)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_are_reported() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<u16> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VigilError::Timeout("always".into()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            VigilError::RetryExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("always"));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: Result<u16> = executor
            .execute(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VigilError::InvalidDomain("bad..domain".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(VigilError::InvalidDomain(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
