//! One retry helper for every network and git call.

use crate::{config::duration_ms, error::SiteError};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub attempts: u32,
    #[serde(with = "duration_ms", rename = "delay_ms")]
    pub delay: Duration,
    /// Delay multiplier applied after every failed attempt. `1` keeps the delay fixed.
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            attempts,
            delay,
            backoff_factor: 1,
        }
    }

    /// Single attempt, no delay.
    pub fn none() -> Self {
        RetryPolicy::new(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, factor: u32) -> Self {
        self.backoff_factor = factor.max(1);
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1);
        let exponent = attempt.saturating_sub(1);
        self.delay
            .saturating_mul(factor.saturating_pow(exponent))
    }
}

/// Run `op` until it succeeds or the policy's attempts are exhausted, returning the last error.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, SiteError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SiteError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "{label}: attempt {attempt}/{attempts} failed ({}), retrying in {:?}",
                    err.headline(),
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(
                    "{label}: giving up after {attempts} attempt(s): {}",
                    err.headline()
                );
                return Err(err);
            }
        }
    }
}
