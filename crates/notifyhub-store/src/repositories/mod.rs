//! Repository implementations.

pub mod notification;

pub use notification::MemoryNotificationStore;
