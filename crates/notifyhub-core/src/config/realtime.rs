//! Real-time connection registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection registry and heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Maximum number of live connections across all users.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Heartbeat sweep interval in milliseconds.
    ///
    /// A connection silent for more than twice this interval is evicted.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    /// Transport-level read timeout in milliseconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
    /// Outbound frame buffer per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Buffer of the inbound client event bus.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
    /// Acknowledgment windows per priority.
    #[serde(default)]
    pub ack_timeouts: AckTimeoutConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            ping_interval_ms: default_ping_interval(),
            ping_timeout_ms: default_ping_timeout(),
            channel_buffer_size: default_channel_buffer(),
            event_bus_capacity: default_event_bus_capacity(),
            ack_timeouts: AckTimeoutConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Heartbeat sweep interval, never zero.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    /// Maximum silence tolerated before a connection counts as stale.
    pub fn stale_after(&self) -> Duration {
        self.ping_interval() * 2
    }

    /// Transport-level read timeout.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms.max(1))
    }
}

/// How long a pushed notification may wait for its acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckTimeoutConfig {
    /// High priority window in milliseconds.
    #[serde(default = "default_high")]
    pub high_ms: u64,
    /// Medium priority window in milliseconds.
    #[serde(default = "default_medium")]
    pub medium_ms: u64,
    /// Low priority window in milliseconds.
    #[serde(default = "default_low")]
    pub low_ms: u64,
}

impl Default for AckTimeoutConfig {
    fn default() -> Self {
        Self {
            high_ms: default_high(),
            medium_ms: default_medium(),
            low_ms: default_low(),
        }
    }
}

fn default_max_connections() -> usize {
    10_000
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    60_000
}

fn default_channel_buffer() -> usize {
    256
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_high() -> u64 {
    5_000
}

fn default_medium() -> u64 {
    10_000
}

fn default_low() -> u64 {
    15_000
}
