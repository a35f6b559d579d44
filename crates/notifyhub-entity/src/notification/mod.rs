//! Notification domain entities.

pub mod delivery;
pub mod model;
pub mod priority;
pub mod request;
pub mod status;

pub use delivery::{DeliveryAttempt, DeliveryMethod};
pub use model::Notification;
pub use priority::Priority;
pub use request::CreateNotificationRequest;
pub use status::{DeliveryState, NotificationStatus};
