//! Maps domain [`AppError`] to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use notifyhub_core::error::{AppError, ErrorKind, FieldError};

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Field-level validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

/// HTTP-facing wrapper around [`AppError`].
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self(error)
    }
}

impl ApiError {
    /// Status code for the wrapped error kind.
    pub fn status(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::Validation | ErrorKind::Serialization => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::CapacityExceeded | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::DeliveryTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = %self.0.kind, error = %self.0.message, "Request failed");
        }

        let AppError {
            kind,
            message,
            details,
            ..
        } = self.0;
        let body = ApiErrorResponse {
            error: kind.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::validation("bad"), StatusCode::BAD_REQUEST),
            (AppError::authentication("no"), StatusCode::UNAUTHORIZED),
            (AppError::rate_limited("slow"), StatusCode::TOO_MANY_REQUESTS),
            (AppError::capacity_exceeded("full"), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::database("down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_body_carries_field_details() {
        let error = AppError::validation_fields(vec![FieldError::new(
            "title",
            "VAL_TITLE_LENGTH",
            "title must be 1-200 characters",
        )]);
        let body = ApiErrorResponse {
            error: error.kind.to_string(),
            message: error.message.clone(),
            details: error.details.clone(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["details"][0]["code"], "VAL_TITLE_LENGTH");
    }
}
