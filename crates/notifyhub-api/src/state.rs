//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use notifyhub_core::config::AppConfig;
use notifyhub_realtime::RealtimeEngine;

/// Application state passed to every handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Delivery engine.
    pub engine: RealtimeEngine,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Build the state around a running engine.
    pub fn new(config: Arc<AppConfig>, engine: RealtimeEngine) -> Self {
        Self {
            config,
            engine,
            started_at: Instant::now(),
        }
    }
}
