// src/services/fetcher.rs

//! Page fetch contract shared by the API and browser strategies.
//!
//! A fetch never fails the caller: after the last attempt it yields a
//! [`PageFailure`] describing what happened, and the orchestrator treats that
//! as "no data for this page".

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::RetryPolicy;

/// Classified failure of a single fetch attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Terminal result of a page fetch that ran out of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub page: u32,
    pub attempts: u32,
    pub error: FetchError,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {} failed after {} attempt(s): {}",
            self.page, self.attempts, self.error
        )
    }
}

/// Outcome of fetching one page.
pub type PageResult = std::result::Result<Value, PageFailure>;

/// One way of getting a listing page as JSON.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Fetch page `page` (1-based), retrying per the strategy's policy.
    async fn fetch(&self, page: u32) -> PageResult;
}

/// Run `attempt` until it succeeds or the policy's attempts are used up.
///
/// Sleeps between attempts only; the delay starts at `initial_delay` and
/// doubles after each failure, bounded by `max_delay` when set.
pub async fn fetch_with_retry<F, Fut>(policy: &RetryPolicy, page: u32, mut attempt: F) -> PageResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<Value, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut tries = 0;

    loop {
        tries += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                log::debug!("page {} attempt {}/{}: {}", page, tries, max_attempts, error);
                if tries >= max_attempts {
                    return Err(PageFailure {
                        page,
                        attempts: tries,
                        error,
                    });
                }
            }
        }

        tokio::time::sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;

    fn policy(max_attempts: u32, initial_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_secs(initial_secs),
            max_delay: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_sleep_between_attempts_only() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = fetch_with_retry(&policy(3, 1), 4, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Timeout("slow".into())) }
        })
        .await;

        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let failure = result.unwrap_err();
        assert_eq!(failure.page, 4);
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error, FetchError::Timeout("slow".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let start = Instant::now();
        let result = fetch_with_retry(&policy(3, 5), 1, || async { Ok(json!({"items": []})) }).await;

        assert_eq!(result.unwrap(), json!({"items": []}));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = fetch_with_retry(&policy(3, 2), 1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FetchError::Status(503))
                } else {
                    Ok(json!({"ok": true}))
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_cap_applies() {
        let start = Instant::now();
        let capped = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Some(Duration::from_secs(1)),
        };

        let result =
            fetch_with_retry(&capped, 1, || async { Err(FetchError::Connection("refused".into())) })
                .await;

        assert_eq!(result.unwrap_err().attempts, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_failure_display() {
        let failure = PageFailure {
            page: 2,
            attempts: 3,
            error: FetchError::Status(502),
        };
        assert_eq!(
            failure.to_string(),
            "page 2 failed after 3 attempt(s): HTTP status 502"
        );
    }
}
