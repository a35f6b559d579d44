//! Persistent connection management: authentication, pool, handles, heartbeat.

pub mod authenticator;
pub mod handle;
pub mod heartbeat;
pub mod pool;
pub mod registry;

pub use authenticator::HandshakeAuthenticator;
pub use handle::{ConnectionHandle, ConnectionInfo};
pub use registry::{ClientEvent, ConnectionRegistry};
