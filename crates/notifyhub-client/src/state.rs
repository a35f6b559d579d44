//! Client connection state.

use serde::{Deserialize, Serialize};

/// Connection state of a [`crate::ClientTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    /// Not connected.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and flushing or sending.
    Connected,
    /// Re-establishing a lost connection.
    Reconnecting,
    /// Gave up; an explicit `connect()` is needed.
    Error,
}

impl TransportState {
    /// Returns true if the connection is active.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true if the connection is in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Reconnecting => write!(f, "RECONNECTING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}
