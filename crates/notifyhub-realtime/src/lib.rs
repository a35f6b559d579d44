//! # notifyhub-realtime
//!
//! Server-side delivery engine for NotifyHub. Provides:
//!
//! - Persistent connection registry with handshake authentication,
//!   acknowledged pushes and heartbeat-based eviction
//! - Fixed-window rate limiting per user and per email recipient
//! - Delivery orchestration across WebSocket and email channels
//! - Per-notification and global delivery metrics

pub mod connection;
pub mod delivery;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use connection::registry::ConnectionRegistry;
pub use delivery::orchestrator::{DeliveryOrchestrator, DispatchOutcome};
pub use metrics::MetricsAggregator;
pub use rate_limit::RateLimiter;
pub use server::RealtimeEngine;
