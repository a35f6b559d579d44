//! Unified error types for NotifyHub.
//!
//! Every crate maps its failures into [`AppError`] so that errors flow through
//! the `?` operator unchanged from the delivery engine up to the HTTP layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error kind categorization used across the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Request fields are missing or malformed.
    Validation,
    /// A per-user or per-recipient rate limit was hit.
    RateLimit,
    /// Handshake credential missing, invalid or expired.
    Authentication,
    /// The connection registry is full.
    CapacityExceeded,
    /// No acknowledgment arrived within the delivery window.
    DeliveryTimeout,
    /// A retried operation ran out of attempts.
    RetryExhausted,
    /// A client emit was never acknowledged after all retries.
    MaxRetriesExceeded,
    /// The operation was cancelled by a disconnect or shutdown.
    Cancelled,
    /// The connection is not (or no longer) usable.
    Connection,
    /// The requested record was not found.
    NotFound,
    /// The notification store failed.
    Database,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// An external collaborator (email relay, ...) failed.
    ExternalService,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::RateLimit => write!(f, "RATE_LIMIT_EXCEEDED"),
            Self::Authentication => write!(f, "AUTHENTICATION"),
            Self::CapacityExceeded => write!(f, "CAPACITY_EXCEEDED"),
            Self::DeliveryTimeout => write!(f, "DELIVERY_TIMEOUT"),
            Self::RetryExhausted => write!(f, "RETRY_EXHAUSTED"),
            Self::MaxRetriesExceeded => write!(f, "MAX_RETRIES_EXCEEDED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Connection => write!(f, "CONNECTION"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Database => write!(f, "DATABASE"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::ExternalService => write!(f, "EXTERNAL_SERVICE"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Request field name.
    pub field: String,
    /// Machine-readable code (`VAL_*`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The unified error used throughout NotifyHub.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Field-level details (validation failures only).
    pub details: Vec<FieldError>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error without field details.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a validation error carrying field-level details.
    pub fn validation_fields(details: Vec<FieldError>) -> Self {
        let message = match details.as_slice() {
            [] => "Request validation failed".to_string(),
            [only] => format!("Invalid field '{}': {}", only.field, only.message),
            many => format!("{} invalid fields", many.len()),
        };
        Self {
            kind: ErrorKind::Validation,
            message,
            details,
            source: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Create a capacity error.
    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapacityExceeded, message)
    }

    /// Create a delivery timeout error.
    pub fn delivery_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeliveryTimeout, message)
    }

    /// Create a retry exhaustion error that keeps the last failure as its source.
    pub fn retry_exhausted(attempts: u32, last: AppError) -> Self {
        Self::with_source(
            ErrorKind::RetryExhausted,
            format!("Gave up after {attempts} attempts: {}", last.message),
            last,
        )
    }

    /// Create a max-retries error for an unacknowledged client emit.
    pub fn max_retries_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MaxRetriesExceeded, message)
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an external service error.
    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns `true` if this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            details: self.details.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_fields_message() {
        let err = AppError::validation_fields(vec![FieldError::new(
            "title",
            "VAL_TITLE_LENGTH",
            "too long",
        )]);
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.details.len(), 1);
        assert!(err.message.contains("title"));
    }

    #[test]
    fn test_retry_exhausted_keeps_last_error() {
        let last = AppError::external("relay returned 502");
        let err = AppError::retry_exhausted(3, last);
        assert!(err.is(ErrorKind::RetryExhausted));
        assert!(err.message.contains("relay returned 502"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_display_uses_kind_code() {
        let err = AppError::rate_limited("slow down");
        assert_eq!(err.to_string(), "RATE_LIMIT_EXCEEDED: slow down");
    }
}
