//! # notifyhub-api
//!
//! HTTP surface of NotifyHub built on Axum.
//!
//! Exposes the WebSocket upgrade (authenticated before the upgrade), the
//! notification creation endpoint, health and metrics, and maps
//! [`notifyhub_core::error::AppError`] to HTTP responses.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
