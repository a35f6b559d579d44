//! Connection registry: authority over live connections: admission, fan-out,
//! acknowledgment tracking, inbound frame handling and stale eviction.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use notifyhub_core::config::RealtimeConfig;
use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_core::types::{MessageId, SocketId, UserId};
use notifyhub_entity::message::{ClientFrame, ServerFrame};
use notifyhub_entity::notification::{DeliveryAttempt, DeliveryMethod, Notification, Priority};

use crate::metrics::EngineCounters;

use super::authenticator::HandshakeAuthenticator;
use super::handle::{ConnectionHandle, ConnectionInfo};
use super::pool::ConnectionPool;

/// An application event emitted by a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Socket the event arrived on.
    pub socket_id: SocketId,
    /// Authenticated sender.
    pub user_id: UserId,
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: serde_json::Value,
}

/// Manages all live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// Connection pool.
    pool: ConnectionPool,
    /// Handshake verification.
    authenticator: HandshakeAuthenticator,
    /// Configuration.
    config: RealtimeConfig,
    /// Engine counters.
    counters: Arc<EngineCounters>,
    /// Inbound client events.
    events: broadcast::Sender<ClientEvent>,
}

impl ConnectionRegistry {
    /// Creates a new registry.
    pub fn new(
        config: RealtimeConfig,
        authenticator: HandshakeAuthenticator,
        counters: Arc<EngineCounters>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_bus_capacity.max(1));
        Self {
            pool: ConnectionPool::new(config.max_connections),
            authenticator,
            config,
            counters,
            events,
        }
    }

    /// Verifies a handshake credential and returns the connecting user.
    pub async fn authenticate(&self, token: Option<&str>) -> AppResult<UserId> {
        let result = self.authenticator.authenticate(token).await;
        if let Err(e) = &result {
            debug!(error = %e, "Handshake rejected");
        }
        result
    }

    /// Registers a new authenticated connection.
    ///
    /// Returns the connection handle and the receiver the socket writer
    /// drains. Fails with `CapacityExceeded` when the registry is full.
    pub fn admit(
        &self,
        user_id: UserId,
    ) -> AppResult<(Arc<ConnectionHandle>, mpsc::Receiver<ServerFrame>)> {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let handle = Arc::new(ConnectionHandle::new(user_id, tx));

        if !self.pool.try_add(handle.clone()) {
            EngineCounters::inc(&self.counters.connections_rejected);
            warn!(
                user_id = %user_id,
                max = self.config.max_connections,
                "Connection refused, registry at capacity"
            );
            return Err(AppError::capacity_exceeded(format!(
                "Connection limit of {} reached",
                self.config.max_connections
            )));
        }

        EngineCounters::inc(&self.counters.connections_opened);
        info!(
            socket_id = %handle.id,
            user_id = %user_id,
            total = self.pool.connection_count(),
            "Connection registered"
        );

        Ok((handle, rx))
    }

    /// Push a notification to every socket of its recipient and wait for the acks.
    ///
    /// Produces one attempt per socket. A recipient without sockets yields
    /// no attempt at all.
    pub async fn broadcast(&self, notification: &Notification) -> Vec<DeliveryAttempt> {
        let sockets = self.pool.get_user_connections(&notification.user_id);
        if sockets.is_empty() {
            debug!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                "No live connection for recipient"
            );
            return Vec::new();
        }

        let timeout = self.ack_timeout(notification.priority);
        join_all(sockets.iter().map(|handle| async move {
            let started = Instant::now();
            let result = self
                .send_with_confirmation(handle, notification, timeout)
                .await;
            let target = Some(handle.id.to_string());
            match result {
                Ok(()) => DeliveryAttempt::succeeded(
                    notification.id,
                    DeliveryMethod::Websocket,
                    target,
                    started.elapsed(),
                ),
                Err(e) => DeliveryAttempt::failed(
                    notification.id,
                    DeliveryMethod::Websocket,
                    target,
                    started.elapsed(),
                    e.to_string(),
                ),
            }
        }))
        .await
    }

    /// Push one notification to one socket and wait up to `timeout` for its ack.
    ///
    /// Never retries. Fails with `DeliveryTimeout` when no ack arrives in
    /// time, or `Connection` when the socket is unusable or closes first.
    pub async fn send_with_confirmation(
        &self,
        handle: &ConnectionHandle,
        notification: &Notification,
        timeout: Duration,
    ) -> AppResult<()> {
        let message_id = MessageId::new();
        let waiter = handle.expect_ack(message_id);
        let frame = ServerFrame::Notification {
            message_id,
            notification: Box::new(notification.clone()),
        };

        if let Err(e) = handle.send(frame) {
            handle.forget_ack(&message_id);
            return Err(e);
        }
        EngineCounters::inc(&self.counters.frames_sent);

        match time::timeout(timeout, waiter).await {
            Ok(Ok(())) => {
                EngineCounters::inc(&self.counters.acks_received);
                Ok(())
            }
            Ok(Err(_)) => Err(AppError::connection(format!(
                "Connection {} closed before acknowledging",
                handle.id
            ))),
            Err(_) => {
                handle.forget_ack(&message_id);
                EngineCounters::inc(&self.counters.delivery_timeouts);
                warn!(
                    socket_id = %handle.id,
                    notification_id = %notification.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Delivery not acknowledged in time"
                );
                Err(AppError::delivery_timeout(format!(
                    "No acknowledgment from socket {} within {}ms",
                    handle.id,
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Acknowledgment window for a priority.
    pub fn ack_timeout(&self, priority: Priority) -> Duration {
        let timeouts = &self.config.ack_timeouts;
        let ms = match priority {
            Priority::High => timeouts.high_ms,
            Priority::Medium => timeouts.medium_ms,
            Priority::Low => timeouts.low_ms,
        };
        Duration::from_millis(ms)
    }

    /// Processes a raw text frame received on `socket_id`.
    ///
    /// Every frame, even a malformed one, counts as liveness.
    pub async fn handle_inbound(&self, socket_id: &SocketId, raw: &str) {
        let Some(handle) = self.pool.get(socket_id) else {
            warn!(socket_id = %socket_id, "Frame from unknown connection");
            return;
        };

        handle.touch().await;
        EngineCounters::inc(&self.counters.frames_received);

        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.reply(
                    &handle,
                    ServerFrame::error("INVALID_MESSAGE", format!("Failed to parse message: {e}")),
                );
                return;
            }
        };

        match frame {
            ClientFrame::Ping { timestamp } => {
                self.reply(&handle, ServerFrame::Pong { timestamp });
            }
            ClientFrame::Ack { message_id } => {
                if !handle.resolve_ack(&message_id) {
                    debug!(socket_id = %socket_id, message_id = %message_id, "Late or unknown ack");
                }
            }
            ClientFrame::Emit {
                message_id,
                event,
                data,
            } => {
                self.reply(&handle, ServerFrame::Ack { message_id });
                // No subscriber is fine.
                let _ = self.events.send(ClientEvent {
                    socket_id: handle.id,
                    user_id: handle.user_id,
                    event,
                    data,
                });
            }
        }
    }

    fn reply(&self, handle: &ConnectionHandle, frame: ServerFrame) {
        match handle.send(frame) {
            Ok(()) => EngineCounters::inc(&self.counters.frames_sent),
            Err(e) => debug!(socket_id = %handle.id, error = %e, "Reply dropped"),
        }
    }

    /// Evict every connection silent for more than twice the ping interval, as of `now`.
    pub async fn sweep_stale(&self, now: Instant) -> Vec<SocketId> {
        let stale_after = self.config.stale_after();
        let mut evicted = Vec::new();

        for handle in self.pool.all_connections() {
            let idle = now.saturating_duration_since(handle.last_heartbeat().await);
            if idle <= stale_after {
                continue;
            }
            // A concurrent disconnect may have removed it already.
            if self.remove(&handle.id) {
                EngineCounters::inc(&self.counters.stale_evicted);
                info!(
                    socket_id = %handle.id,
                    user_id = %handle.user_id,
                    idle_ms = idle.as_millis() as u64,
                    "Stale connection evicted"
                );
                evicted.push(handle.id);
            }
        }

        evicted
    }

    /// Run one heartbeat sweep against the current time.
    pub async fn heartbeat_sweep(&self) -> Vec<SocketId> {
        self.sweep_stale(Instant::now()).await
    }

    /// Unregisters a connection. Unknown or already removed ids are a no-op.
    pub fn on_disconnect(&self, socket_id: &SocketId) -> bool {
        let removed = self.remove(socket_id);
        if removed {
            info!(socket_id = %socket_id, "Connection unregistered");
        }
        removed
    }

    fn remove(&self, socket_id: &SocketId) -> bool {
        match self.pool.remove(socket_id) {
            Some(handle) => {
                handle.close();
                EngineCounters::inc(&self.counters.connections_closed);
                true
            }
            None => false,
        }
    }

    /// Closes all connections, failing every outstanding ack wait.
    pub fn close_all(&self) {
        let all = self.pool.all_connections();
        for handle in &all {
            self.remove(&handle.id);
        }
        info!(count = all.len(), "All connections closed");
    }

    /// Returns the total connection count.
    pub fn total_connections(&self) -> usize {
        self.pool.connection_count()
    }

    /// Sum of per-user socket counts; equals [`ConnectionRegistry::total_connections`] when quiescent.
    pub fn indexed_connections(&self) -> usize {
        self.pool.indexed_count()
    }

    /// Returns the number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.pool.user_count()
    }

    /// Socket ids of one user.
    pub fn sockets_of(&self, user_id: &UserId) -> Vec<SocketId> {
        self.pool
            .get_user_connections(user_id)
            .iter()
            .map(|h| h.id)
            .collect()
    }

    /// Checks if a user currently has at least one connection.
    pub fn is_user_connected(&self, user_id: &UserId) -> bool {
        !self.pool.get_user_connections(user_id).is_empty()
    }

    /// Returns all connected user IDs.
    pub fn connected_user_ids(&self) -> Vec<UserId> {
        self.pool.connected_user_ids()
    }

    /// Snapshot of one connection.
    pub async fn connection_info(&self, socket_id: &SocketId) -> Option<ConnectionInfo> {
        match self.pool.get(socket_id) {
            Some(handle) => Some(handle.info().await),
            None => None,
        }
    }

    /// Subscribe to application events emitted by clients.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Returns the engine counters.
    pub fn counters(&self) -> &Arc<EngineCounters> {
        &self.counters
    }
}
