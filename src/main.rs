//! NotifyHub Server: real-time notification delivery engine.
//!
//! Main entry point that wires all crates together and starts the server.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use notifyhub_api::{AppState, build_router};
use notifyhub_auth::JwtDecoder;
use notifyhub_core::config::AppConfig;
use notifyhub_realtime::RealtimeEngine;
use notifyhub_realtime::delivery::build_email_sender;
use notifyhub_store::MemoryNotificationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("NOTIFYHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = AppConfig::load(&env).context("Failed to load configuration")?;

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    run(config).await
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting NotifyHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Collaborators ────────────────────────────────────
    let store = Arc::new(MemoryNotificationStore::new());
    let verifier = Arc::new(JwtDecoder::new(&config.auth));
    let email = build_email_sender(&config.delivery.email)
        .context("Failed to initialize email channel")?;

    // ── Step 2: Delivery engine ──────────────────────────────────
    let engine = RealtimeEngine::new(&config, verifier, store, email);
    engine.start().await;

    // ── Step 3: HTTP server ──────────────────────────────────────
    let addr = config.server.bind_address();
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = AppState::new(Arc::new(config), engine.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("NotifyHub server listening on {}", addr);

    // ── Step 4: Graceful shutdown ────────────────────────────────
    // Open sockets keep the server alive, so the engine closes them as soon
    // as the signal arrives.
    let shutdown_engine = engine.clone();
    let stopping = engine.shutdown_token();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
            shutdown_engine.shutdown().await;
        })
        .into_future();

    tokio::select! {
        result = server => result.context("HTTP server error")?,
        _ = async {
            stopping.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!(grace_seconds = grace.as_secs(), "Grace period elapsed, forcing shutdown");
        }
    }

    tracing::info!("NotifyHub server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
