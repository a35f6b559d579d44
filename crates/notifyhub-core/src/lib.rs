//! # notifyhub-core
//!
//! Core crate for the NotifyHub delivery engine. Contains the collaborator
//! traits (notification store, email channel, token verifier), configuration
//! schemas, typed identifiers, the shared retry engine, and the unified
//! error system.
//!
//! This crate has **no** internal dependencies on other NotifyHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind, FieldError};
pub use result::AppResult;
pub use retry::{RetryEngine, RetryPolicy};
