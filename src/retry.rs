use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Retryable};

/// Fixed-delay retry budget. `max_retries` counts retries, so an operation
/// runs at most `max_retries + 1` times.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay_ms: delay.as_millis() as u64,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

/// Runs `op` until it succeeds, fails with an error `should_retry` rejects,
/// or the budget is spent. The last error is returned as is.
pub async fn retry_if<T, E, F, Fut, P>(policy: RetryPolicy, mut op: F, should_retry: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut remaining = policy.max_retries;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if remaining > 0 && should_retry(&err) => {
                tracing::warn!(
                    error = %err,
                    remaining,
                    "operation failed, retrying in {:?}",
                    policy.delay()
                );
                tokio::time::sleep(policy.delay()).await;
                remaining -= 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`retry_if`] using the error's own [`Retryable`] classification.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    retry_if(policy, op, E::is_retryable).await
}

/// Races `fut` against a timer; the timer winning yields [`AgentError::Timeout`].
pub async fn with_timeout<T, Fut>(after: Duration, what: &str, fut: Fut) -> Result<T, AgentError>
where
    Fut: Future<Output = Result<T, AgentError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout {
            what: what.to_string(),
            after,
        }),
    }
}
