//! Periodic eviction of silent connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::ConnectionRegistry;

/// Run the heartbeat sweep every `interval` until `shutdown` fires.
///
/// The first sweep happens one full interval after start.
pub async fn run_heartbeat_sweeper(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                registry.heartbeat_sweep().await;
            }
        }
    }

    debug!("Heartbeat sweeper stopped");
}
