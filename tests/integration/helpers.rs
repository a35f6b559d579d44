//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use notifyhub_api::{AppState, build_router};
use notifyhub_auth::{JwtDecoder, JwtEncoder};
use notifyhub_client::{ClientConfig, ClientTransport, WsConnector};
use notifyhub_core::config::AppConfig;
use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_core::traits::{EmailMessage, EmailSender};
use notifyhub_core::types::UserId;
use notifyhub_entity::notification::{CreateNotificationRequest, DeliveryMethod, Priority};
use notifyhub_realtime::RealtimeEngine;
use notifyhub_realtime::delivery::LogEmailSender;
use notifyhub_store::MemoryNotificationStore;

/// A NotifyHub server listening on an ephemeral port.
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// The engine behind the router.
    pub engine: RealtimeEngine,
    /// Issues credentials accepted by the server.
    pub encoder: JwtEncoder,
    server: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with a logging email channel.
    pub async fn start(config: AppConfig) -> Self {
        Self::start_with_email(config, Arc::new(LogEmailSender)).await
    }

    /// Start a server with the given email channel.
    pub async fn start_with_email(config: AppConfig, email: Arc<dyn EmailSender>) -> Self {
        let engine = RealtimeEngine::new(
            &config,
            Arc::new(JwtDecoder::new(&config.auth)),
            Arc::new(MemoryNotificationStore::new()),
            email,
        );
        engine.start().await;

        let encoder = JwtEncoder::new(&config.auth);
        let state = AppState::new(Arc::new(config), engine.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let token = engine.shutdown_token();
        let server = tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            addr,
            engine,
            encoder,
            server,
        }
    }

    /// WebSocket endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Client configuration carrying a valid credential for `user_id`.
    pub fn client_config(&self, user_id: UserId) -> ClientConfig {
        let mut config = ClientConfig::new(self.ws_url()).with_token(self.encoder.issue(user_id).unwrap());
        config.connect_timeout_ms = 5_000;
        config
    }

    /// A client transport for `config`.
    pub fn client_with(&self, config: ClientConfig) -> ClientTransport {
        let connector = Arc::new(WsConnector::new(&config));
        ClientTransport::new(config, connector)
    }

    /// A client transport authenticated as `user_id`.
    pub fn client(&self, user_id: UserId) -> ClientTransport {
        self.client_with(self.client_config(user_id))
    }

    /// Poll until the registry holds `count` connections.
    pub async fn wait_for_connections(&self, count: usize) {
        let registry = self.engine.registry.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while registry.total_connections() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("registry never reached {count} connections"));
    }

    /// Shut the engine and the HTTP server down.
    pub async fn stop(self) {
        self.engine.shutdown().await;
        let _ = self.server.await;
    }
}

/// A create request for `user_id` over `methods`.
pub fn request(
    user_id: UserId,
    methods: Vec<DeliveryMethod>,
    priority: Priority,
) -> CreateNotificationRequest {
    CreateNotificationRequest {
        user_id: Some(user_id),
        notification_type: "task.assigned".into(),
        title: "Task assigned".into(),
        message: "You have been assigned a new task".into(),
        priority,
        delivery_methods: methods,
        metadata: HashMap::new(),
    }
}

/// Email channel that records messages and fails the first `failures` sends.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<EmailMessage>>,
    failures: AtomicU32,
}

impl RecordingEmailSender {
    pub fn failing(failures: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::external("relay unavailable"));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
