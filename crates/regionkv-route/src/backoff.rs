//! Retry budget passed through to metadata authority calls.
//!
//! The cache never inspects a `Backoffer`; it hands the caller's token to the
//! authority client, which calls [`Backoffer::backoff`] between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{is_retryable, AuthorityError, Result, RouteError};

/// Configuration for a retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum number of backoff rounds (default: 10).
    pub max_attempts: u32,
    /// Sleep before the first retry in ms (default: 100).
    pub base_ms: u64,
    /// Cap on a single sleep in ms (default: 2000).
    pub max_sleep_ms: u64,
    /// Cap on the total time slept across all rounds in ms (default: 20000).
    pub total_budget_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_ms: 100,
            max_sleep_ms: 2_000,
            total_budget_ms: 20_000,
        }
    }
}

/// A bounded retry budget for one logical operation.
#[derive(Debug, Clone)]
pub struct Backoffer {
    config: BackoffConfig,
    attempts: u32,
    slept_ms: u64,
}

impl Backoffer {
    /// Creates an unused budget.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
            slept_ms: 0,
        }
    }

    /// Budget used for region and store lookups.
    pub fn get_backoff() -> Self {
        Self::new(BackoffConfig::default())
    }

    /// Records a failed attempt and sleeps before the next one.
    ///
    /// Returns the error back to the caller, wrapped, if it is not retryable or
    /// if the budget is spent.
    pub async fn backoff(&mut self, error: AuthorityError) -> Result<()> {
        if !is_retryable(&error) {
            return Err(RouteError::Authority(error));
        }

        let sleep = self.next_sleep();
        let over_budget = self.slept_ms.saturating_add(sleep.as_millis() as u64)
            > self.config.total_budget_ms;
        if self.attempts >= self.config.max_attempts || over_budget {
            return Err(RouteError::BackoffExhausted {
                attempts: self.attempts,
                last_error: error,
            });
        }

        self.attempts += 1;
        self.slept_ms = self.slept_ms.saturating_add(sleep.as_millis() as u64);
        tracing::debug!(
            attempt = self.attempts,
            sleep_ms = sleep.as_millis() as u64,
            error = %error,
            "backing off metadata authority call"
        );
        tokio::time::sleep(sleep).await;
        Ok(())
    }

    /// Exponential sleep for the next round: `base_ms * 2^attempts`, capped.
    fn next_sleep(&self) -> Duration {
        let shift = self.attempts.min(20);
        let ms = self
            .config
            .base_ms
            .saturating_mul(1u64 << shift)
            .min(self.config.max_sleep_ms);
        Duration::from_millis(ms)
    }

    /// Backoff rounds taken so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total time slept so far, in ms.
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }
}

impl Default for Backoffer {
    fn default() -> Self {
        Self::get_backoff()
    }
}
