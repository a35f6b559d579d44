//! Individual persistent connection handle.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_core::types::{MessageId, SocketId, UserId};
use notifyhub_entity::message::ServerFrame;

/// A handle to a single client connection.
///
/// Holds the sender for pushing frames to the client, the acknowledgment
/// waiters of in-flight pushes, and liveness bookkeeping.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique socket ID
    pub id: SocketId,
    /// User who owns this connection
    pub user_id: UserId,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Sender for outbound frames
    sender: mpsc::Sender<ServerFrame>,
    /// Last frame received from the client
    last_heartbeat: RwLock<Instant>,
    /// Frames exchanged in either direction
    message_count: AtomicU64,
    /// Waiters for client acknowledgments, by pushed message id
    pending_acks: DashMap<MessageId, oneshot::Sender<()>>,
    /// Fired when the connection is closed for any reason
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(user_id: UserId, sender: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id: SocketId::new(),
            user_id,
            connected_at: Utc::now(),
            sender,
            last_heartbeat: RwLock::new(Instant::now()),
            message_count: AtomicU64::new(0),
            pending_acks: DashMap::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Queue a frame for this connection without waiting.
    ///
    /// A full buffer or a closed writer fails immediately.
    pub fn send(&self, frame: ServerFrame) -> AppResult<()> {
        if !self.is_alive() {
            return Err(AppError::connection(format!("Connection {} is closed", self.id)));
        }
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.message_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(socket_id = %self.id, "Send buffer full, dropping frame");
                Err(AppError::connection(format!(
                    "Connection {} send buffer full",
                    self.id
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(AppError::connection(format!(
                    "Connection {} writer closed",
                    self.id
                )))
            }
        }
    }

    /// Register a waiter for the acknowledgment of `message_id`.
    pub fn expect_ack(&self, message_id: MessageId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.pending_acks.insert(message_id, tx);
        rx
    }

    /// Resolve the waiter for `message_id`. Returns `false` for unknown or late acks.
    pub fn resolve_ack(&self, message_id: &MessageId) -> bool {
        match self.pending_acks.remove(message_id) {
            Some((_, tx)) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for `message_id` without resolving it.
    pub fn forget_ack(&self, message_id: &MessageId) {
        self.pending_acks.remove(message_id);
    }

    /// Number of pushes still waiting for an acknowledgment.
    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        !self.closed.is_cancelled()
    }

    /// Close the connection: stop the socket tasks and fail every pending ack wait.
    pub fn close(&self) {
        self.closed.cancel();
        // Dropping the senders wakes every waiter with a receive error.
        self.pending_acks.clear();
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Record a frame received from the client.
    pub async fn touch(&self) {
        *self.last_heartbeat.write().await = Instant::now();
        self.message_count.fetch_add(1, Ordering::Relaxed);
    }

    /// When the client was last heard from.
    pub async fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.read().await
    }

    /// Frames exchanged so far.
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// Get a snapshot of connection info
    pub async fn info(&self) -> ConnectionInfo {
        let idle = self.last_heartbeat().await.elapsed();
        ConnectionInfo {
            socket_id: self.id,
            user_id: self.user_id,
            connected_at: self.connected_at,
            idle_ms: u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
            message_count: self.message_count(),
            pending_acks: self.pending_ack_count(),
            alive: self.is_alive(),
        }
    }
}

/// Snapshot of connection info (serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Socket ID
    pub socket_id: SocketId,
    /// User ID
    pub user_id: UserId,
    /// Connected at
    pub connected_at: DateTime<Utc>,
    /// Time since the client was last heard from
    pub idle_ms: u64,
    /// Frames exchanged
    pub message_count: u64,
    /// Pushes awaiting acknowledgment
    pub pending_acks: usize,
    /// Is alive
    pub alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_fails_pending_waiters() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = ConnectionHandle::new(UserId::new(), tx);
        let waiter = handle.expect_ack(MessageId::new());

        handle.close();
        assert!(waiter.await.is_err());
        assert!(!handle.is_alive());
        assert!(handle.send(ServerFrame::Pong { timestamp: 0 }).is_err());
    }

    #[tokio::test]
    async fn test_full_buffer_fails_fast() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(UserId::new(), tx);
        assert!(handle.send(ServerFrame::Pong { timestamp: 1 }).is_ok());
        assert!(handle.send(ServerFrame::Pong { timestamp: 2 }).is_err());
        assert!(handle.is_alive());
    }

    #[tokio::test]
    async fn test_late_ack_is_ignored() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(UserId::new(), tx);
        let id = MessageId::new();
        let waiter = handle.expect_ack(id);
        handle.forget_ack(&id);
        drop(waiter);
        assert!(!handle.resolve_ack(&id));
    }
}
