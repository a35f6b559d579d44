//! Route handlers organized by domain.

pub mod health;
pub mod metrics;
pub mod notification;
pub mod ws;
