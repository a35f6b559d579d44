//! Inbound request to create and dispatch a notification.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use notifyhub_core::error::{AppError, FieldError};
use notifyhub_core::result::AppResult;
use notifyhub_core::types::UserId;

use super::delivery::DeliveryMethod;
use super::priority::Priority;

/// Create-notification request body.
///
/// Every field is optional at the decode level so that a missing field is
/// reported as a `VAL_*` field error instead of a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    /// Recipient user.
    #[serde(default)]
    #[validate(required(code = "VAL_USER_REQUIRED", message = "userId is required"))]
    pub user_id: Option<UserId>,
    /// Application-defined notification type (e.g. `task.assigned`).
    #[serde(rename = "type", default)]
    #[validate(length(
        min = 1,
        max = 100,
        code = "VAL_TYPE_LENGTH",
        message = "type must be 1-100 characters"
    ))]
    pub notification_type: String,
    /// Title, 1–200 characters.
    #[serde(default)]
    #[validate(
        length(
            min = 1,
            max = 200,
            code = "VAL_TITLE_LENGTH",
            message = "title must be 1-200 characters"
        ),
        custom(function = "not_blank")
    )]
    pub title: String,
    /// Body, 1–2000 characters.
    #[serde(default)]
    #[validate(
        length(
            min = 1,
            max = 2000,
            code = "VAL_MESSAGE_LENGTH",
            message = "message must be 1-2000 characters"
        ),
        custom(function = "not_blank")
    )]
    pub message: String,
    /// Priority, `MEDIUM` when omitted.
    #[serde(default)]
    pub priority: Priority,
    /// Requested channels; must not be empty.
    #[serde(default, alias = "delivery_method")]
    #[validate(length(
        min = 1,
        code = "VAL_DELIVERY_METHOD_REQUIRED",
        message = "at least one delivery method is required"
    ))]
    pub delivery_methods: Vec<DeliveryMethod>,
    /// Free-form metadata carried on the notification.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty() && value.trim().is_empty() {
        let mut err = ValidationError::new("VAL_BLANK");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

impl CreateNotificationRequest {
    /// Validate the request, returning field-level `VAL_*` errors.
    pub fn check(&self) -> AppResult<()> {
        self.validate()
            .map_err(|errors| AppError::validation_fields(field_errors(&errors)))
    }
}

/// Flatten validator output into sorted [`FieldError`]s using wire field names.
fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let name = wire_name(&field).to_string();
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{name} is invalid"));
                FieldError::new(name.clone(), e.code.to_string(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.code.cmp(&b.code)));
    out
}

fn wire_name(field: &str) -> &str {
    match field {
        "notification_type" => "type",
        other => other,
    }
}
