//! Shared value types.

pub mod id;

pub use id::{MessageId, NotificationId, SocketId, UserId};
