//! Top-level delivery engine that ties together all subsystems.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use notifyhub_core::config::AppConfig;
use notifyhub_core::traits::{EmailSender, TokenVerifier};

use crate::connection::heartbeat::run_heartbeat_sweeper;
use crate::connection::{ConnectionRegistry, HandshakeAuthenticator};
use crate::delivery::{DeliveryOrchestrator, NotificationStore, OrchestratorDeps};
use crate::metrics::{CountersSnapshot, DeliveryMetrics, EngineCounters, MetricsAggregator};
use crate::rate_limit::RateLimiter;

/// Central engine that coordinates the registry, orchestrator and background tasks.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Delivery orchestrator.
    pub orchestrator: Arc<DeliveryOrchestrator>,
    /// Rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Delivery metrics.
    pub metrics: Arc<MetricsAggregator>,
    /// Engine counters.
    pub counters: Arc<EngineCounters>,
    /// Rate limit purge interval.
    purge_interval: Duration,
    /// Shutdown signal.
    shutdown: CancellationToken,
    /// Background tasks started by [`RealtimeEngine::start`].
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine").finish()
    }
}

/// Serializable view of the engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Live connections.
    pub connections: usize,
    /// Users with at least one live connection.
    pub users: usize,
    /// Engine counters.
    pub counters: CountersSnapshot,
    /// Delivery metrics over every recorded notification.
    pub delivery: DeliveryMetrics,
}

impl RealtimeEngine {
    /// Creates a new engine with all subsystems.
    pub fn new(
        config: &AppConfig,
        verifier: Arc<dyn TokenVerifier>,
        store: Arc<NotificationStore>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let counters = Arc::new(EngineCounters::new());
        let limiter = Arc::new(RateLimiter::new());
        let metrics = Arc::new(MetricsAggregator::new());
        let registry = Arc::new(ConnectionRegistry::new(
            config.realtime.clone(),
            HandshakeAuthenticator::new(verifier),
            counters.clone(),
        ));
        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            OrchestratorDeps {
                store,
                registry: registry.clone(),
                limiter: limiter.clone(),
                email,
                metrics: metrics.clone(),
                counters: counters.clone(),
            },
            config.delivery.clone(),
            shutdown.child_token(),
        ));

        info!(
            max_connections = config.realtime.max_connections,
            ping_interval_ms = config.realtime.ping_interval_ms,
            "Delivery engine initialized"
        );

        Self {
            registry,
            orchestrator,
            limiter,
            metrics,
            counters,
            purge_interval: Duration::from_secs(
                config.delivery.rate_limit.purge_interval_seconds.max(1),
            ),
            shutdown,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Spawn the heartbeat sweeper and the rate limit purge loop.
    pub async fn start(&self) {
        let sweeper = tokio::spawn(run_heartbeat_sweeper(
            self.registry.clone(),
            self.registry.config().ping_interval(),
            self.shutdown.child_token(),
        ));
        let purger = tokio::spawn(run_rate_limit_purge(
            self.limiter.clone(),
            self.purge_interval,
            self.shutdown.child_token(),
        ));

        let mut tasks = self.tasks.lock().await;
        tasks.push(sweeper);
        tasks.push(purger);
        info!("Delivery engine background tasks started");
    }

    /// Returns a token that fires when the engine shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Current engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            connections: self.registry.total_connections(),
            users: self.registry.user_count(),
            counters: self.counters.snapshot(),
            delivery: self.metrics.global(),
        }
    }

    /// Initiates a graceful shutdown: stops background tasks and email
    /// retries, then closes every connection.
    pub async fn shutdown(&self) {
        info!("Shutting down delivery engine");
        self.shutdown.cancel();
        self.registry.close_all();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Background task ended abnormally");
            }
        }

        info!("Delivery engine shut down");
    }
}

/// Periodically drop expired rate windows until `shutdown` fires.
async fn run_rate_limit_purge(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = limiter.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = limiter.len(), "Expired rate windows purged");
                }
            }
        }
    }
}
