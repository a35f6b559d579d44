//! # notifyhub-store
//!
//! Record store implementations for notifications. The delivery engine only
//! depends on [`notifyhub_core::traits::Repository`]; this crate provides
//! the process-local implementation used by the server binary and tests.

pub mod repositories;

pub use repositories::MemoryNotificationStore;
