//! Strategies for reading price and stock text off a target page

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::{MonitorTarget, PageReading};

pub mod browser;
pub mod http;

pub use browser::BrowserStrategy;
pub use http::HttpStrategy;

/// User agent presented by both strategies
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// One way of extracting price and stock text from a target.
///
/// The monitor tries strategies in order and keeps the first success, so an
/// implementation reports failure through its return value and must not leave
/// resources behind on either path.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Fetch the page and evaluate both selectors.
    ///
    /// A selector that matches nothing yields [`crate::models::NOT_AVAILABLE`],
    /// not an error.
    async fn fetch(&self, target: &MonitorTarget) -> Result<PageReading>;
}

/// Bounded retry with a fixed pause between attempts and a timeout per attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds or the attempts run out, returning the last error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow!(
                    "{what} timed out after {}ms",
                    self.attempt_timeout.as_millis()
                )),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("{what} was never attempted")))
    }
}
