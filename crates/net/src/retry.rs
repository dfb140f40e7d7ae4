//! Retry policy for remote requests

use kiln_config::Config;
use kiln_errors::UserFacingError;
use kiln_events::{DownloadEvent, EventEmitter};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a request is repeated
///
/// The first attempt runs immediately; each retry waits `retry_wait`.
/// Only retryable failures (timeouts, connection failures, 5xx and 429)
/// are repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub retry_wait: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_wait: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Policy from the `[network]` section
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.network.retries,
            retry_wait: Duration::from_secs(config.network.retry_delay),
            timeout: Duration::from_secs(config.network.timeout),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Run `attempt` until it succeeds, fails for good, or attempts run out
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once every
    /// attempt has failed.
    pub async fn run<T, Er, F, Fut, E>(
        &self,
        url: &str,
        emitter: &E,
        mut attempt: F,
    ) -> Result<T, Er>
    where
        Er: UserFacingError + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Er>>,
        E: EventEmitter + ?Sized,
    {
        let max_attempts = self.max_attempts();
        let mut current = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && current < max_attempts => {
                    warn!(
                        url,
                        attempt = current,
                        max_attempts,
                        error = %err,
                        "request failed, retrying"
                    );
                    emitter.emit_download(DownloadEvent::Retrying {
                        url: url.to_string(),
                        attempt: current,
                        max_attempts,
                        delay: self.retry_wait,
                        error: err.to_string(),
                    });
                    tokio::time::sleep(self.retry_wait).await;
                    current += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
