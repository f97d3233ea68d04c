//! Bounded retries with a per-attempt deadline and linear backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aulabot_shared::{AulabotError, FetchConfig, Fetcher, QuerySpec, Result, ResultSet};
use tracing::{debug, instrument, warn};

/// How many times to try, how long to wait between tries, and how long
/// each try may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub attempts: u32,
    /// Attempt `n` (1-based) that fails transiently is followed by a
    /// `n * base_delay` pause.
    pub base_delay: Duration,
    /// Deadline for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: config.retry_delay(),
            timeout: config.timeout(),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Wraps another [`Fetcher`], retrying transient failures.
///
/// Permanent failures (backend-reported errors, malformed responses,
/// validation) are returned on the first occurrence.
pub struct RetryingFetcher {
    inner: Arc<dyn Fetcher>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Fetcher for RetryingFetcher {
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(skip_all, fields(backend = self.inner.name(), query = %query.label()))]
    async fn fetch(&self, query: &QuerySpec) -> Result<ResultSet> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.policy.timeout, self.inner.fetch(query)).await
            {
                Ok(result) => result,
                Err(_) => Err(AulabotError::Timeout(format!(
                    "no answer within {:?}",
                    self.policy.timeout
                ))),
            };

            match outcome {
                Ok(rows) => {
                    if attempt > 1 {
                        debug!(attempt, "fetch succeeded after retry");
                    }
                    return Ok(rows);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    let wait = self.policy.backoff(attempt);
                    warn!(attempt, max = attempts, error = %err, ?wait, "transient fetch failure, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    warn!(attempts, error = %err, "fetch failed on every attempt");
                    return Err(AulabotError::Exhausted {
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
