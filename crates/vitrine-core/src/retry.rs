use std::future::Future;
use std::time::Duration;

use crate::error::CrawlError;

/// Bounded retry with a fixed backoff for interactive actions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Result of running an action under a [`RetryPolicy`].
#[derive(Debug)]
pub enum Attempt<T> {
    Succeeded(T),
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last_error: CrawlError },
    /// A non-transient error; returned on first sight.
    Failed(CrawlError),
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Run `action`, retrying transient failures.
    ///
    /// Never propagates the error as `Err`: the caller gets a terminal
    /// [`Attempt`] and decides whether the target ends.
    pub async fn with_retry<T, F, Fut>(&self, label: &str, mut action: F) -> Attempt<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CrawlError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match action().await {
                Ok(value) => return Attempt::Succeeded(value),
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(%label, error = %e, "Action failed, not retryable");
                    return Attempt::Failed(e);
                }
                Err(e) if attempt > self.max_retries => {
                    tracing::warn!(%label, attempts = attempt, error = %e, "Retries exhausted");
                    return Attempt::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    };
                }
                Err(e) => {
                    tracing::debug!(
                        %label,
                        attempt,
                        backoff_ms = %self.backoff.as_millis(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}
