//! Client transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use notifyhub_core::retry::RetryPolicy;

/// Client transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint, e.g. `ws://localhost:8080/ws`.
    pub url: String,
    /// Bearer credential presented at connect time.
    #[serde(default)]
    pub token: Option<String>,
    /// Interval between outbound pings, in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Handshake timeout, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Reconnection attempts after a connection loss before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Backoff between reconnection attempts. `max_attempts` is taken from
    /// `max_reconnect_attempts`.
    #[serde(default = "RetryPolicy::reconnect")]
    pub reconnect_backoff: RetryPolicy,
    /// Backoff between emit retries. `max_attempts` is taken from the emit options.
    #[serde(default = "default_emit_backoff")]
    pub emit_backoff: RetryPolicy,
    /// Default acknowledgment timeout of an emit, in milliseconds.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_ms: u64,
    /// Default number of emit retries after the first transmission.
    #[serde(default = "default_emit_retries")]
    pub emit_retries: u32,
    /// Maximum queued emits while offline. Unbounded when absent.
    #[serde(default)]
    pub max_queue_size: Option<usize>,
    /// Frame buffer per direction.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
}

impl ClientConfig {
    /// Configuration with defaults for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            heartbeat_interval_ms: default_heartbeat_interval(),
            connect_timeout_ms: default_connect_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff: RetryPolicy::reconnect(),
            emit_backoff: default_emit_backoff(),
            ack_timeout_ms: default_ack_timeout(),
            emit_retries: default_emit_retries(),
            max_queue_size: None,
            channel_buffer_size: default_channel_buffer(),
        }
    }

    /// Sets the bearer credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Interval between outbound pings.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Emit options used by [`crate::ClientTransport::emit`].
    pub fn default_emit_options(&self) -> EmitOptions {
        EmitOptions {
            timeout: Duration::from_millis(self.ack_timeout_ms),
            retries: self.emit_retries,
        }
    }

    /// Retry policy of an emit with `retries` retries.
    pub fn emit_policy(&self, retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: retries.saturating_add(1),
            ..self.emit_backoff.clone()
        }
    }

    /// Retry policy of the reconnection loop.
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_reconnect_attempts,
            ..self.reconnect_backoff.clone()
        }
    }
}

/// Per-emit delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// How long each transmission waits for its acknowledgment.
    pub timeout: Duration,
    /// Retransmissions after the first one.
    pub retries: u32,
}

fn default_heartbeat_interval() -> u64 {
    25_000
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_emit_backoff() -> RetryPolicy {
    RetryPolicy::new(3, 250, 5_000, 100)
}

fn default_ack_timeout() -> u64 {
    5_000
}

fn default_emit_retries() -> u32 {
    3
}

fn default_channel_buffer() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies_take_attempts_from_options() {
        let config = ClientConfig::new("ws://localhost/ws");
        assert_eq!(config.emit_policy(2).max_attempts, 3);
        assert_eq!(config.emit_policy(2).base_backoff_ms, 250);
        assert_eq!(config.reconnect_policy().max_attempts, 5);
        assert_eq!(config.reconnect_policy().max_backoff_ms, 30_000);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"url":"ws://h/ws","max_queue_size":10}"#).unwrap();
        assert_eq!(config.max_queue_size, Some(10));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(25));
    }
}
