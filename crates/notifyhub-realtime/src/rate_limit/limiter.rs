//! Fixed-window rate limiter keyed by subject.
//!
//! Each key owns a window `{count, reset_at}` created lazily on first use.
//! A check that finds the window expired starts a fresh one; a check at the
//! limit is refused without counting.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;

/// Counter of one key.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The call was counted.
    Allowed {
        /// Calls left in the current window.
        remaining: u32,
        /// When the window resets.
        reset_at: Instant,
    },
    /// The limit is reached; nothing was counted.
    Exceeded {
        /// When the window resets.
        reset_at: Instant,
    },
}

impl RateDecision {
    /// Whether the call was refused.
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded { .. })
    }

    /// Time until the window resets, measured from `now`.
    pub fn retry_after(&self, now: Instant) -> Duration {
        match self {
            Self::Allowed { reset_at, .. } | Self::Exceeded { reset_at } => {
                reset_at.saturating_duration_since(now)
            }
        }
    }
}

/// Fixed-window rate limiter.
///
/// The read-modify-write of a key runs under that key's map shard lock, so
/// concurrent callers on the same key never over-admit.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call for `key` unless `limit` is already reached in the current window.
    pub fn check_and_increment(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        self.check_and_increment_at(key, limit, window, Instant::now())
    }

    /// [`RateLimiter::check_and_increment`] at an explicit instant.
    pub fn check_and_increment_at(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> RateDecision {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow {
                count: 0,
                reset_at: now + window,
            });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count >= limit {
            return RateDecision::Exceeded {
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: limit - entry.count,
            reset_at: entry.reset_at,
        }
    }

    /// Like [`RateLimiter::check_and_increment`], but refusals become a
    /// `RateLimit` error naming the key.
    pub fn admit(&self, key: &str, limit: u32, window: Duration) -> AppResult<()> {
        let now = Instant::now();
        let decision = self.check_and_increment_at(key, limit, window, now);
        if decision.is_exceeded() {
            debug!(key, limit, "Rate limit exceeded");
            return Err(AppError::rate_limited(format!(
                "Rate limit of {limit} per {}s exceeded for {key}; retry in {}s",
                window.as_secs(),
                decision.retry_after(now).as_secs().max(1)
            )));
        }
        Ok(())
    }

    /// Give back one call counted for `key` in its current window.
    ///
    /// A no-op when the window expired or nothing was counted.
    pub fn release(&self, key: &str) {
        let now = Instant::now();
        if let Some(mut entry) = self.windows.get_mut(key)
            && now <= entry.reset_at
        {
            entry.count = entry.count.saturating_sub(1);
        }
    }

    /// Current count of `key`, if it has a live window.
    pub fn current(&self, key: &str) -> Option<u32> {
        let now = Instant::now();
        self.windows
            .get(key)
            .filter(|w| now <= w.reset_at)
            .map(|w| w.count)
    }

    /// Drop every window whose reset time has passed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| now <= w.reset_at);
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
