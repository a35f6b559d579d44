//! Retry with exponential backoff and jitter.
//!
//! One algorithm serves every component that can fail transiently: the email
//! channel on the server, and reconnection plus emit confirmation on the
//! client. Only the constants differ, carried by [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppError, ErrorKind};
use crate::result::AppResult;

/// Backoff constants for a retried operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,
    /// Upper bound of the exponential part, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Upper bound of the random component added to each delay, in milliseconds.
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter_ms: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from explicit constants.
    pub fn new(max_attempts: u32, base_backoff_ms: u64, max_backoff_ms: u64, jitter_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms,
            max_backoff_ms,
            jitter_ms,
        }
    }

    /// Constants used by the email channel.
    pub fn email() -> Self {
        Self::default()
    }

    /// Constants used by client reconnection.
    pub fn reconnect() -> Self {
        Self::new(5, 1_000, 30_000, 1_000)
    }

    /// A policy with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0, 0)
    }

    /// Effective number of attempts (never less than one).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Deterministic part of the delay after the failure at `attempt_index`:
    /// `min(base * 2^attempt_index, max_backoff)`.
    pub fn base_delay(&self, attempt_index: u32) -> Duration {
        let multiplier = 1u64.checked_shl(attempt_index).unwrap_or(u64::MAX);
        let exp_ms = self
            .base_backoff_ms
            .saturating_mul(multiplier)
            .min(self.max_backoff_ms);
        Duration::from_millis(exp_ms)
    }

    /// Full delay after the failure at `attempt_index`, jitter included.
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        let base = self.base_delay(attempt_index);
        if self.jitter_ms == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=self.jitter_ms);
        base + Duration::from_millis(jitter)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    1_000
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_jitter() -> u64 {
    250
}

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryEngine {
    /// Name used in log lines.
    name: String,
    /// Backoff constants.
    policy: RetryPolicy,
}

impl RetryEngine {
    /// Create an engine for the named operation.
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    /// The policy this engine applies.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Try `op` up to `max_attempts` times.
    ///
    /// `op` receives the zero-based attempt index. After exhaustion the result
    /// is a `RetryExhausted` error whose source is the last failure. A
    /// `Cancelled` error from `op` is returned immediately.
    pub async fn attempt<F, Fut, T>(&self, op: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.run(None, op).await
    }

    /// Like [`RetryEngine::attempt`], but every backoff sleep races `token`.
    ///
    /// Once the token fires no further attempt is made and `Cancelled` is
    /// returned.
    pub async fn attempt_until_cancelled<F, Fut, T>(
        &self,
        token: &CancellationToken,
        op: F,
    ) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.run(Some(token), op).await
    }

    async fn run<F, Fut, T>(&self, token: Option<&CancellationToken>, mut op: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.policy.attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            if token.is_some_and(|t| t.is_cancelled()) {
                return Err(AppError::cancelled(format!("{} cancelled", self.name)));
            }

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = %self.name,
                            attempt = attempt + 1,
                            "Succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if e.is(ErrorKind::Cancelled) => return Err(e),
                Err(e) => {
                    if attempt + 1 < attempts {
                        let delay = self.policy.backoff(attempt);
                        warn!(
                            operation = %self.name,
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Attempt failed, backing off"
                        );
                        match token {
                            Some(token) => {
                                tokio::select! {
                                    _ = token.cancelled() => {
                                        return Err(AppError::cancelled(format!(
                                            "{} cancelled during backoff",
                                            self.name
                                        )));
                                    }
                                    _ = tokio::time::sleep(delay) => {}
                                }
                            }
                            None => tokio::time::sleep(delay).await,
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| AppError::internal(format!("{} made no attempt", self.name)));
        warn!(operation = %self.name, attempts, error = %last, "Retries exhausted");
        Err(AppError::retry_exhausted(attempts, last))
    }
}
