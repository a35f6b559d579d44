//! # notifyhub-client
//!
//! Client side of the NotifyHub persistent connection:
//!
//! - Explicit connection state machine published through a watch channel
//! - Outbound queue for events emitted while offline, flushed in order on connect
//! - Acknowledged emits with timeout and retry
//! - Bounded reconnection with exponential backoff
//! - Event subscriptions for pushed notifications

pub mod client;
pub mod config;
pub mod queue;
pub mod state;
pub mod subscriptions;
pub mod transport;

pub use client::ClientTransport;
pub use config::{ClientConfig, EmitOptions};
pub use state::TransportState;
pub use subscriptions::SubscriptionId;
pub use transport::{Connection, Connector, WsConnector};
