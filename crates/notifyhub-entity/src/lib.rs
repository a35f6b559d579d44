//! # notifyhub-entity
//!
//! Domain entities shared by the server engine and the client transport:
//! notifications, delivery attempts, the creation request, and the JSON
//! frames exchanged over the persistent connection.

pub mod message;
pub mod notification;

pub use message::{ClientFrame, ServerFrame};
pub use notification::{
    CreateNotificationRequest, DeliveryAttempt, DeliveryMethod, DeliveryState, Notification,
    NotificationStatus, Priority,
};
