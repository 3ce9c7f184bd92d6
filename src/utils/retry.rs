//! Retry with exponential backoff for transient provider failures.
//!
//! Sources never retry on their own; the resolver wraps each provider call in
//! [`with_retry`] so the policy lives in one place and respects the identifier budget.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::models::ProviderResult;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first one (0 disables retries)
    #[serde(default)]
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
        }
    }
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    /// Set the number of retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Backoff delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32 - 1);
        Duration::from_millis(exp.min(self.max_delay_ms as f64) as u64)
    }
}

/// Run a provider call, retrying transient failures.
///
/// A retry is only attempted when its backoff delay ends before `deadline`;
/// otherwise the last result is returned as is.
pub async fn with_retry<F, Fut>(config: RetryConfig, deadline: Instant, operation: F) -> ProviderResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult>,
{
    let mut operation = operation;
    let mut retries = 0;

    loop {
        let result = operation().await;

        let transient = result.error_kind.is_some_and(|kind| kind.is_transient());
        if !transient || retries >= config.max_retries {
            if retries > 0 && result.found {
                tracing::info!(
                    "{} succeeded after {} transient failures",
                    result.provider,
                    retries
                );
            }
            return result;
        }

        retries += 1;
        let delay = config.delay_for(retries);
        if Instant::now() + delay >= deadline {
            tracing::debug!(
                "{}: no budget left for retry {} ({:?} backoff)",
                result.provider,
                retries,
                delay
            );
            return result;
        }

        tracing::debug!(
            "{}: transient {:?}, retry {}/{} in {:?}",
            result.provider,
            result.error_kind,
            retries,
            config.max_retries,
            delay
        );
        sleep(delay).await;
    }
}
