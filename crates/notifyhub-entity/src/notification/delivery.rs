//! Delivery channels and per-attempt delivery records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use notifyhub_core::types::NotificationId;

/// A delivery transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryMethod {
    /// Push over a live persistent connection.
    Websocket,
    /// Asynchronous email fallback.
    Email,
    /// Mobile push (placeholder, never attempted).
    Push,
}

impl DeliveryMethod {
    /// Every channel, in dispatch order.
    pub const ALL: [DeliveryMethod; 3] = [Self::Websocket, Self::Email, Self::Push];

    /// Return the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Websocket => "WEBSOCKET",
            Self::Email => "EMAIL",
            Self::Push => "PUSH",
        }
    }
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One timed outcome of delivering a notification via one channel to one target.
///
/// Attempts are append-only: fields are private and there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    notification_id: NotificationId,
    channel: DeliveryMethod,
    target: Option<String>,
    timestamp: DateTime<Utc>,
    success: bool,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DeliveryAttempt {
    /// Record a successful attempt.
    pub fn succeeded(
        notification_id: NotificationId,
        channel: DeliveryMethod,
        target: Option<String>,
        duration: Duration,
    ) -> Self {
        Self::record(notification_id, channel, target, duration, None)
    }

    /// Record a failed attempt.
    pub fn failed(
        notification_id: NotificationId,
        channel: DeliveryMethod,
        target: Option<String>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self::record(notification_id, channel, target, duration, Some(error.into()))
    }

    fn record(
        notification_id: NotificationId,
        channel: DeliveryMethod,
        target: Option<String>,
        duration: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            notification_id,
            channel,
            target,
            timestamp: Utc::now(),
            success: error.is_none(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            error,
        }
    }

    /// Notification this attempt belongs to.
    pub fn notification_id(&self) -> NotificationId {
        self.notification_id
    }

    /// Channel used.
    pub fn channel(&self) -> DeliveryMethod {
        self.channel
    }

    /// Socket id, recipient key, or `None` when the channel has no target.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// When the attempt finished.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether the attempt succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Wall time spent on the attempt.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Failure reason, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
