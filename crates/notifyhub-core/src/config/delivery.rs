//! Delivery orchestration configuration: rate limits, email channel, status policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Delivery orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Admission thresholds.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Email fallback channel.
    #[serde(default)]
    pub email: EmailConfig,
    /// Mark a notification `ARCHIVED` when every attempted channel failed.
    #[serde(default = "default_true")]
    pub archive_on_failure: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            email: EmailConfig::default(),
            archive_on_failure: true,
        }
    }
}

/// Fixed-window rate limit thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Notifications a single user may create per minute.
    #[serde(default = "default_per_minute")]
    pub max_per_minute: u32,
    /// Notifications a single user may create per hour.
    #[serde(default = "default_per_hour")]
    pub max_per_hour: u32,
    /// Emails a single recipient may receive per hour.
    #[serde(default = "default_email_per_hour")]
    pub email_per_recipient_per_hour: u32,
    /// How often expired windows are purged, in seconds.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: default_per_minute(),
            max_per_hour: default_per_hour(),
            email_per_recipient_per_hour: default_email_per_hour(),
            purge_interval_seconds: default_purge_interval(),
        }
    }
}

impl RateLimitConfig {
    /// One-minute window.
    pub const MINUTE: Duration = Duration::from_secs(60);
    /// One-hour window.
    pub const HOUR: Duration = Duration::from_secs(3600);
}

/// Email channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// HTTP relay endpoint. When absent, emails are only logged.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Sender address placed on outgoing mail.
    #[serde(default = "default_from")]
    pub from_address: String,
    /// Relay request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Retry policy for transient relay failures.
    #[serde(default = "RetryPolicy::email")]
    pub retry: RetryPolicy,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            from_address: default_from(),
            request_timeout_ms: default_request_timeout(),
            retry: RetryPolicy::email(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_per_minute() -> u32 {
    60
}

fn default_per_hour() -> u32 {
    1000
}

fn default_email_per_hour() -> u32 {
    20
}

fn default_purge_interval() -> u64 {
    300
}

fn default_from() -> String {
    "notifications@localhost".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}
