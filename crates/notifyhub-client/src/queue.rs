//! Outbound queue of events emitted while offline.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_core::types::MessageId;
use notifyhub_entity::message::ClientFrame;

use crate::config::EmitOptions;

/// An emit waiting for a connection, or for its acknowledgment.
#[derive(Debug)]
pub struct PendingMessage {
    /// Message id carried by every transmission.
    pub message_id: MessageId,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: serde_json::Value,
    /// Delivery options.
    pub options: EmitOptions,
    /// Transmissions made so far.
    pub attempts: u32,
    /// When the emit was queued.
    pub enqueued_at: Instant,
    resolver: oneshot::Sender<AppResult<()>>,
}

impl PendingMessage {
    /// Create a pending message and the receiver its caller awaits.
    pub fn new(
        message_id: MessageId,
        event: String,
        data: serde_json::Value,
        options: EmitOptions,
    ) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (resolver, rx) = oneshot::channel();
        let pending = Self {
            message_id,
            event,
            data,
            options,
            attempts: 0,
            enqueued_at: Instant::now(),
            resolver,
        };
        (pending, rx)
    }

    /// The wire frame of this message.
    pub fn frame(&self) -> ClientFrame {
        ClientFrame::Emit {
            message_id: self.message_id,
            event: self.event.clone(),
            data: self.data.clone(),
        }
    }

    /// Complete the caller's pending emit.
    pub fn resolve(self, result: AppResult<()>) {
        // The caller may have stopped waiting.
        let _ = self.resolver.send(result);
    }
}

/// FIFO of pending messages with an optional bound.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<PendingMessage>,
    max_size: Option<usize>,
}

impl OutboundQueue {
    /// Create a queue holding at most `max_size` messages.
    pub fn new(max_size: Option<usize>) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Append a message. Fails with `CapacityExceeded` when the queue is full.
    pub fn push(&mut self, message: PendingMessage) -> AppResult<()> {
        if let Some(max) = self.max_size
            && self.items.len() >= max
        {
            return Err(AppError::capacity_exceeded(format!(
                "Outbound queue full ({max} messages)"
            )));
        }
        self.items.push_back(message);
        Ok(())
    }

    /// Take every queued message, oldest first.
    pub fn drain(&mut self) -> Vec<PendingMessage> {
        self.items.drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use notifyhub_core::error::ErrorKind;
    use std::time::Duration;

    use super::*;

    fn pending(event: &str) -> (PendingMessage, oneshot::Receiver<AppResult<()>>) {
        PendingMessage::new(
            MessageId::new(),
            event.to_string(),
            serde_json::Value::Null,
            EmitOptions {
                timeout: Duration::from_secs(1),
                retries: 0,
            },
        )
    }

    #[test]
    fn test_drain_is_fifo() {
        let mut queue = OutboundQueue::new(None);
        for event in ["a", "b", "c"] {
            queue.push(pending(event).0).unwrap();
        }
        let events: Vec<String> = queue.drain().into_iter().map(|p| p.event).collect();
        assert_eq!(events, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bound_is_enforced() {
        let mut queue = OutboundQueue::new(Some(1));
        queue.push(pending("a").0).unwrap();
        let err = queue.push(pending("b").0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_reaches_caller() {
        let (message, rx) = pending("a");
        message.resolve(Err(AppError::cancelled("bye")));
        assert_eq!(rx.await.unwrap().unwrap_err().kind, ErrorKind::Cancelled);
    }
}
