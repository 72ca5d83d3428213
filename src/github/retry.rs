//! Exponential backoff for GitHub API calls.
//!
//! Each page request of a backfill pass is retried on transient failures
//! (3 retries, 2s/4s/8s by default). Permanent errors are returned at once,
//! and an exhausted budget fails the pass; the next scheduled pass starts over.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::error::{GitHubApiError, GitHubErrorKind};

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retries, not counting the initial attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap for exponential growth.
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 retries with 2s, 4s, 8s delays.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry number `attempt` (0-indexed):
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }

    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the retry budget
/// is spent. The last error is returned in the failure cases.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T, GitHubApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubApiError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if e.kind == GitHubErrorKind::Permanent || attempt >= max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                debug!(attempt, ?delay, error = %e, "Retrying GitHub request");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
