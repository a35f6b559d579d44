//! JSON frames exchanged over a persistent connection.
//!
//! Every frame is a JSON object tagged by a `type` field. Frames are
//! symmetric in spirit: the server pushes notifications and expects an
//! `ack`, the client emits events and expects an `ack` back.

use serde::{Deserialize, Serialize};

use notifyhub_core::types::MessageId;

use crate::notification::Notification;

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Liveness probe; answered with [`ServerFrame::Pong`].
    Ping {
        /// Client clock, echoed back.
        timestamp: i64,
    },
    /// Confirms receipt of a pushed notification.
    Ack {
        /// Id of the acknowledged message.
        message_id: MessageId,
    },
    /// Application event emitted by the client; the server acks it.
    Emit {
        /// Client-generated message id.
        message_id: MessageId,
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        data: serde_json::Value,
    },
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A pushed notification awaiting acknowledgment.
    Notification {
        /// Server-generated message id.
        message_id: MessageId,
        /// The notification.
        notification: Box<Notification>,
    },
    /// Confirms receipt of a client emit.
    Ack {
        /// Id of the acknowledged message.
        message_id: MessageId,
    },
    /// Reply to [`ClientFrame::Ping`].
    Pong {
        /// Timestamp copied from the ping.
        timestamp: i64,
    },
    /// Protocol-level error.
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl ServerFrame {
    /// Build an error frame.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
