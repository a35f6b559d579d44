//! Engine-level event counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counters updated by the registry and the orchestrator.
#[derive(Debug, Default)]
pub struct EngineCounters {
    /// Connections admitted
    pub connections_opened: AtomicU64,
    /// Connections removed (disconnect, eviction or shutdown)
    pub connections_closed: AtomicU64,
    /// Handshakes refused for capacity
    pub connections_rejected: AtomicU64,
    /// Connections evicted by the heartbeat sweep
    pub stale_evicted: AtomicU64,
    /// Frames queued for clients
    pub frames_sent: AtomicU64,
    /// Frames received from clients
    pub frames_received: AtomicU64,
    /// Pushes acknowledged in time
    pub acks_received: AtomicU64,
    /// Pushes never acknowledged in time
    pub delivery_timeouts: AtomicU64,
    /// Notifications admitted and stored
    pub notifications_created: AtomicU64,
    /// Creation requests refused by the rate limiter
    pub notifications_rate_limited: AtomicU64,
    /// Emails handed to the relay
    pub emails_sent: AtomicU64,
    /// Email attempts that ended in failure
    pub emails_failed: AtomicU64,
}

impl EngineCounters {
    /// Create new zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            stale_evicted: self.stale_evicted.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            delivery_timeouts: self.delivery_timeouts.load(Ordering::Relaxed),
            notifications_created: self.notifications_created.load(Ordering::Relaxed),
            notifications_rate_limited: self.notifications_rate_limited.load(Ordering::Relaxed),
            emails_sent: self.emails_sent.load(Ordering::Relaxed),
            emails_failed: self.emails_failed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    /// Connections admitted
    pub connections_opened: u64,
    /// Connections removed
    pub connections_closed: u64,
    /// Handshakes refused for capacity
    pub connections_rejected: u64,
    /// Stale evictions
    pub stale_evicted: u64,
    /// Frames queued for clients
    pub frames_sent: u64,
    /// Frames received from clients
    pub frames_received: u64,
    /// Acknowledged pushes
    pub acks_received: u64,
    /// Unacknowledged pushes
    pub delivery_timeouts: u64,
    /// Notifications created
    pub notifications_created: u64,
    /// Creations refused by rate limit
    pub notifications_rate_limited: u64,
    /// Emails sent
    pub emails_sent: u64,
    /// Emails failed
    pub emails_failed: u64,
}
