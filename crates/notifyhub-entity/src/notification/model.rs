//! Notification entity model.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use notifyhub_core::error::{AppError, FieldError};
use notifyhub_core::result::AppResult;
use notifyhub_core::types::{NotificationId, UserId};

use super::delivery::{DeliveryAttempt, DeliveryMethod};
use super::priority::Priority;
use super::request::CreateNotificationRequest;
use super::status::{DeliveryState, NotificationStatus};

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: NotificationId,
    /// The recipient user.
    pub user_id: UserId,
    /// Application-defined type.
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Title (1–200 characters).
    pub title: String,
    /// Body (1–2000 characters).
    pub message: String,
    /// Priority level.
    pub priority: Priority,
    /// Read state.
    pub status: NotificationStatus,
    /// Outcome of the delivery pass.
    pub delivery_state: DeliveryState,
    /// Requested channels; never empty.
    pub delivery_methods: BTreeSet<DeliveryMethod>,
    /// Attempts recorded by the delivery pass.
    #[serde(default)]
    pub attempts: Vec<DeliveryAttempt>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
    /// When the notification was last modified.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped by the store on every update.
    pub version: u64,
}

impl Notification {
    /// Build a fresh notification from a validated request.
    ///
    /// Runs the request validation again so that a notification with an
    /// empty channel set can never be constructed.
    pub fn from_request(request: CreateNotificationRequest) -> AppResult<Self> {
        request.check()?;
        let user_id = request.user_id.ok_or_else(|| {
            AppError::validation_fields(vec![FieldError::new(
                "user_id",
                "VAL_USER_REQUIRED",
                "userId is required",
            )])
        })?;
        let now = Utc::now();

        Ok(Self {
            id: NotificationId::new(),
            user_id,
            notification_type: request.notification_type,
            title: request.title,
            message: request.message,
            priority: request.priority,
            status: NotificationStatus::Unread,
            delivery_state: DeliveryState::Pending,
            delivery_methods: request.delivery_methods.into_iter().collect(),
            attempts: Vec::new(),
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Whether the given channel was requested.
    pub fn wants(&self, method: DeliveryMethod) -> bool {
        self.delivery_methods.contains(&method)
    }

    /// Record the outcome of a delivery pass.
    ///
    /// With `archive_on_failure`, a pass in which every attempted channel
    /// failed moves the notification to `ARCHIVED`; otherwise the read state
    /// is left as is.
    pub fn apply_delivery(&mut self, attempts: Vec<DeliveryAttempt>, archive_on_failure: bool) {
        let succeeded = attempts.iter().filter(|a| a.success()).count();
        self.delivery_state = DeliveryState::from_outcomes(attempts.len(), succeeded);
        if archive_on_failure && self.delivery_state == DeliveryState::Failed {
            self.status = NotificationStatus::Archived;
        }
        self.attempts.extend(attempts);
        self.updated_at = Utc::now();
    }
}
