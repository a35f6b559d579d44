//! Client transport: connection state machine, acknowledged emits with
//! retry, an offline queue and bounded reconnection.
//!
//! State transitions:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> CONNECTED | ERROR
//! CONNECTED -> DISCONNECTED -> RECONNECTING -> CONNECTED | ERROR
//! ERROR -> CONNECTING (explicit connect)
//! any -> DISCONNECTED (explicit disconnect, terminal)
//! ```
//!
//! Entering `ERROR` rejects every queued emit, and emits made while in
//! `ERROR` fail immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use notifyhub_core::error::{AppError, ErrorKind};
use notifyhub_core::result::AppResult;
use notifyhub_core::retry::RetryEngine;
use notifyhub_core::types::MessageId;
use notifyhub_entity::message::{ClientFrame, ServerFrame};

use crate::config::{ClientConfig, EmitOptions};
use crate::queue::{OutboundQueue, PendingMessage};
use crate::state::TransportState;
use crate::subscriptions::{SubscriptionId, Subscriptions};
use crate::transport::{Connection, Connector};

/// Event name under which pushed notifications are dispatched.
pub const NOTIFICATION_EVENT: &str = "notification";

/// Event name under which server error frames are dispatched.
pub const ERROR_EVENT: &str = "error";

/// Client side of a persistent notification connection.
#[derive(Debug, Clone)]
pub struct ClientTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<TransportState>,
    /// Sender of the live connection, if any.
    outgoing: RwLock<Option<mpsc::Sender<ClientFrame>>>,
    /// Cancels the reader and heartbeat of the live connection.
    session: Mutex<Option<CancellationToken>>,
    /// Serializes connect and reconnect.
    connecting: Mutex<()>,
    acks: DashMap<MessageId, oneshot::Sender<()>>,
    queue: Mutex<OutboundQueue>,
    subscriptions: Subscriptions,
    reconnect_attempts: AtomicU32,
    /// Fired by `disconnect()`; never reset.
    closed: CancellationToken,
}

impl ClientTransport {
    /// Create a disconnected transport.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(TransportState::Disconnected);
        let queue = OutboundQueue::new(config.max_queue_size);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state,
                outgoing: RwLock::new(None),
                session: Mutex::new(None),
                connecting: Mutex::new(()),
                acks: DashMap::new(),
                queue: Mutex::new(queue),
                subscriptions: Subscriptions::default(),
                reconnect_attempts: AtomicU32::new(0),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Connect and flush the offline queue in order.
    ///
    /// A no-op when already connected. Fails with `Cancelled` after
    /// [`ClientTransport::disconnect`].
    pub async fn connect(&self) -> AppResult<()> {
        let inner = &self.inner;
        inner.ensure_open()?;
        let _guard = inner.connecting.lock().await;
        inner.ensure_open()?;
        if inner.current_state().is_connected() {
            return Ok(());
        }

        inner.set_state(TransportState::Connecting);
        let result = tokio::select! {
            _ = inner.closed.cancelled() => Err(AppError::cancelled("Transport disconnected")),
            result = inner.connector.connect() => result,
        };

        match result {
            Ok(connection) => Inner::establish(inner, connection).await,
            Err(e) => {
                if !inner.closed.is_cancelled() {
                    inner
                        .fail(ErrorKind::Connection, &format!("Connect failed: {}", e.message))
                        .await;
                }
                warn!(error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    /// Emit `event` with the configured default options.
    pub async fn emit(&self, event: &str, data: serde_json::Value) -> AppResult<()> {
        let options = self.inner.config.default_emit_options();
        self.emit_with(event, data, options).await
    }

    /// Emit `event` and wait for the server's acknowledgment.
    ///
    /// While offline the message is queued and sent on the next connect.
    /// Each transmission waits `options.timeout` for its ack; after
    /// `options.retries` retransmissions the emit fails with
    /// `MaxRetriesExceeded`. In `ERROR` the emit fails with `Connection`
    /// until the next successful connect.
    pub async fn emit_with(
        &self,
        event: &str,
        data: serde_json::Value,
        options: EmitOptions,
    ) -> AppResult<()> {
        let inner = &self.inner;
        inner.ensure_open()?;
        let message_id = MessageId::new();

        let mut queue = inner.queue.lock().await;
        if inner.current_state() == TransportState::Error {
            return Err(AppError::connection(
                "Transport is in ERROR state; call connect() first",
            ));
        }
        if inner.current_state().is_connected() && queue.is_empty() {
            let frame = ClientFrame::Emit {
                message_id,
                event: event.to_string(),
                data,
            };
            let primed = inner.transmit(message_id, frame.clone()).await.ok();
            drop(queue);
            return inner.deliver(message_id, frame, options, primed).await;
        }

        let (pending, rx) = PendingMessage::new(message_id, event.to_string(), data, options);
        queue.push(pending)?;
        debug!(%message_id, event, queued = queue.len(), "Emit queued");
        drop(queue);

        if inner.current_state().is_connected() {
            Inner::flush(inner).await;
        }

        rx.await
            .unwrap_or_else(|_| Err(AppError::cancelled("Message dropped before delivery")))
    }

    /// Close the connection and stop for good.
    ///
    /// Queued and in-flight emits fail with `Cancelled`. Idempotent.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        if inner.closed.is_cancelled() {
            return;
        }
        inner.closed.cancel();

        if let Some(session) = inner.session.lock().await.take() {
            session.cancel();
        }
        inner.outgoing.write().await.take();
        inner.acks.clear();

        let pending = inner.queue.lock().await.drain();
        let rejected = pending.len();
        for message in pending {
            message.resolve(Err(AppError::cancelled("Transport disconnected")));
        }

        inner.set_state(TransportState::Disconnected);
        info!(rejected, "Disconnected");
    }

    /// Register `callback` for `event`.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.inner.subscriptions.subscribe(event, Arc::new(callback))
    }

    /// Remove a callback registered with [`ClientTransport::subscribe`].
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        self.inner.subscriptions.unsubscribe(event, id)
    }

    /// Current connection state.
    pub fn state(&self) -> TransportState {
        self.inner.current_state()
    }

    /// Receiver of state changes.
    pub fn state_changes(&self) -> watch::Receiver<TransportState> {
        self.inner.state.subscribe()
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Reconnection attempts made since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Number of emits waiting for a connection.
    pub async fn queued(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// Number of transmissions waiting for an acknowledgment.
    pub fn awaiting_ack(&self) -> usize {
        self.inner.acks.len()
    }
}

impl Inner {
    fn ensure_open(&self) -> AppResult<()> {
        if self.closed.is_cancelled() {
            return Err(AppError::cancelled("Transport disconnected"));
        }
        Ok(())
    }

    fn current_state(&self) -> TransportState {
        *self.state.borrow()
    }

    fn set_state(&self, state: TransportState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Transport state changed");
        }
    }

    /// Enter `ERROR` and reject every queued emit with `kind`.
    ///
    /// Callers hold the `connecting` lock, so no flush races the drain.
    async fn fail(&self, kind: ErrorKind, reason: &str) {
        self.set_state(TransportState::Error);
        let pending = self.queue.lock().await.drain();
        if pending.is_empty() {
            return;
        }
        warn!(rejected = pending.len(), reason, "Rejecting queued emits");
        for message in pending {
            message.resolve(Err(AppError::new(kind, reason)));
        }
    }

    /// Install a fresh connection, start its tasks and flush the queue.
    async fn establish(inner: &Arc<Self>, connection: Connection) -> AppResult<()> {
        inner.ensure_open()?;
        let Connection { outgoing, incoming } = connection;

        let session = inner.closed.child_token();
        if let Some(previous) = inner.session.lock().await.replace(session.clone()) {
            previous.cancel();
        }
        *inner.outgoing.write().await = Some(outgoing);
        inner.reconnect_attempts.store(0, Ordering::Relaxed);
        inner.set_state(TransportState::Connected);
        info!("Transport connected");

        tokio::spawn(run_session(inner.clone(), incoming, session.clone()));
        tokio::spawn(run_heartbeat(
            inner.clone(),
            inner.config.heartbeat_interval(),
            session,
        ));

        Inner::flush(inner).await;
        Ok(())
    }

    /// Send every queued message in order, then wait for their acks in the
    /// background.
    async fn flush(inner: &Arc<Self>) {
        let mut queue = inner.queue.lock().await;
        let pending = queue.drain();
        if pending.is_empty() {
            return;
        }

        let mut sent = Vec::with_capacity(pending.len());
        for mut message in pending {
            let primed = match inner.transmit(message.message_id, message.frame()).await {
                Ok(waiter) => {
                    message.attempts += 1;
                    Some(waiter)
                }
                Err(e) => {
                    debug!(message_id = %message.message_id, error = %e, "Flush transmission failed");
                    None
                }
            };
            sent.push((message, primed));
        }
        drop(queue);
        debug!(count = sent.len(), "Outbound queue flushed");

        for (message, primed) in sent {
            let inner = inner.clone();
            tokio::spawn(async move {
                let result = inner
                    .deliver(message.message_id, message.frame(), message.options, primed)
                    .await;
                message.resolve(result);
            });
        }
    }

    /// Register an ack waiter and put `frame` on the wire.
    async fn transmit(
        &self,
        message_id: MessageId,
        frame: ClientFrame,
    ) -> AppResult<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.acks.insert(message_id, tx);

        let sender = self.outgoing.read().await.clone();
        let Some(sender) = sender else {
            self.acks.remove(&message_id);
            return Err(AppError::connection("Not connected"));
        };
        if sender.send(frame).await.is_err() {
            self.acks.remove(&message_id);
            return Err(AppError::connection("Connection lost"));
        }
        Ok(rx)
    }

    async fn await_ack(
        &self,
        message_id: MessageId,
        waiter: oneshot::Receiver<()>,
        timeout: Duration,
    ) -> AppResult<()> {
        match time::timeout(timeout, waiter).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) if self.closed.is_cancelled() => {
                Err(AppError::cancelled("Transport disconnected"))
            }
            Ok(Err(_)) => Err(AppError::connection("Acknowledgment lost")),
            Err(_) => {
                self.acks.remove(&message_id);
                Err(AppError::delivery_timeout(format!(
                    "No acknowledgment for {message_id} within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Wait for the ack of `frame`, retransmitting under the emit policy.
    /// `primed` is the waiter of a transmission already made.
    async fn deliver(
        self: &Arc<Self>,
        message_id: MessageId,
        frame: ClientFrame,
        options: EmitOptions,
        primed: Option<oneshot::Receiver<()>>,
    ) -> AppResult<()> {
        let engine = RetryEngine::new("emit", self.config.emit_policy(options.retries));
        let mut primed = primed;

        let result = engine
            .attempt_until_cancelled(&self.closed, |_| {
                let inner = self.clone();
                let frame = frame.clone();
                let primed = primed.take();
                async move {
                    let waiter = match primed {
                        Some(waiter) => waiter,
                        None => inner.transmit(message_id, frame).await?,
                    };
                    inner.await_ack(message_id, waiter, options.timeout).await
                }
            })
            .await;

        match result {
            Err(e) if e.is(ErrorKind::RetryExhausted) => {
                self.acks.remove(&message_id);
                warn!(%message_id, attempts = options.retries + 1, "Emit not acknowledged");
                Err(AppError::max_retries_exceeded(format!(
                    "Message {message_id} not acknowledged after {} attempts",
                    options.retries + 1
                )))
            }
            other => other,
        }
    }

    async fn on_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Ack { message_id } => {
                if let Some((_, waiter)) = self.acks.remove(&message_id) {
                    let _ = waiter.send(());
                } else {
                    debug!(%message_id, "Ack for unknown message");
                }
            }
            ServerFrame::Notification {
                message_id,
                notification,
            } => {
                let sender = self.outgoing.read().await.clone();
                if let Some(sender) = sender
                    && sender.send(ClientFrame::Ack { message_id }).await.is_err()
                {
                    debug!(%message_id, "Could not acknowledge notification");
                }
                match serde_json::to_value(&notification) {
                    Ok(payload) => {
                        self.subscriptions.dispatch(NOTIFICATION_EVENT, &payload);
                    }
                    Err(e) => warn!(error = %e, "Failed to encode notification"),
                }
            }
            ServerFrame::Pong { timestamp } => {
                debug!(timestamp, "Pong received");
            }
            ServerFrame::Error { code, message } => {
                warn!(%code, %message, "Server reported an error");
                let payload = serde_json::json!({ "code": code, "message": message });
                self.subscriptions.dispatch(ERROR_EVENT, &payload);
            }
        }
    }

    async fn connection_lost(inner: &Arc<Self>, session: &CancellationToken) {
        session.cancel();
        inner.outgoing.write().await.take();
        if inner.closed.is_cancelled() {
            return;
        }
        inner.set_state(TransportState::Disconnected);
        warn!("Connection lost");
        Inner::reconnect(inner).await;
    }

    /// Re-establish the connection under the reconnect policy. Exhaustion
    /// rejects queued emits with `RetryExhausted` and leaves the transport
    /// in `ERROR` until `connect()` is called.
    async fn reconnect(inner: &Arc<Self>) {
        let _guard = inner.connecting.lock().await;
        if inner.closed.is_cancelled() || inner.current_state().is_connected() {
            return;
        }
        if inner.config.max_reconnect_attempts == 0 {
            inner
                .fail(ErrorKind::RetryExhausted, "Reconnection disabled")
                .await;
            return;
        }

        inner.set_state(TransportState::Reconnecting);
        let engine = RetryEngine::new("reconnect", inner.config.reconnect_policy());
        let result = engine
            .attempt_until_cancelled(&inner.closed, |attempt| {
                inner
                    .reconnect_attempts
                    .store(attempt + 1, Ordering::Relaxed);
                let connector = inner.connector.clone();
                async move { connector.connect().await }
            })
            .await;

        match result {
            Ok(connection) => {
                if let Err(e) = Inner::establish(inner, connection).await {
                    debug!(error = %e, "Reconnected after disconnect");
                }
            }
            Err(e) if e.is(ErrorKind::Cancelled) => {
                debug!("Reconnection cancelled");
            }
            Err(e) => {
                inner.fail(ErrorKind::RetryExhausted, &e.message).await;
                error!(
                    attempts = inner.reconnect_attempts.load(Ordering::Relaxed),
                    error = %e,
                    "Reconnection failed"
                );
            }
        }
    }
}

/// Read frames of one connection until it ends, then reconnect.
fn run_session(
    inner: Arc<Inner>,
    mut incoming: mpsc::Receiver<ServerFrame>,
    session: CancellationToken,
) -> BoxFuture<'static, ()> {
    async move {
        loop {
            let frame = tokio::select! {
                _ = session.cancelled() => return,
                frame = incoming.recv() => frame,
            };
            match frame {
                Some(frame) => inner.on_frame(frame).await,
                None => break,
            }
        }
        Inner::connection_lost(&inner, &session).await;
    }
    .boxed()
}

async fn run_heartbeat(inner: Arc<Inner>, period: Duration, session: CancellationToken) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = session.cancelled() => break,
            _ = ticker.tick() => {
                let sender = inner.outgoing.read().await.clone();
                let Some(sender) = sender else { continue };
                let ping = ClientFrame::Ping {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                };
                if sender.try_send(ping).is_err() {
                    debug!("Ping dropped");
                }
            }
        }
    }
}
