//! Read-state and delivery-state enumerations.

use serde::{Deserialize, Serialize};

/// User-facing state of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    /// Not yet read.
    #[default]
    Unread,
    /// Read by the user.
    Read,
    /// Archived by the user, or by the engine after total delivery failure.
    Archived,
}

/// Outcome of the engine's delivery pass, tracked apart from [`NotificationStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// Persisted, dispatch not finished.
    #[default]
    Pending,
    /// At least one attempt succeeded.
    Delivered,
    /// Every attempt failed.
    Failed,
    /// No attempt could be made (e.g. recipient offline).
    NoRecipient,
}

impl DeliveryState {
    /// Derive the state from per-attempt outcomes.
    pub fn from_outcomes(attempted: usize, succeeded: usize) -> Self {
        match (attempted, succeeded) {
            (0, _) => Self::NoRecipient,
            (_, 0) => Self::Failed,
            _ => Self::Delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_outcomes() {
        assert_eq!(DeliveryState::from_outcomes(0, 0), DeliveryState::NoRecipient);
        assert_eq!(DeliveryState::from_outcomes(2, 0), DeliveryState::Failed);
        assert_eq!(DeliveryState::from_outcomes(2, 1), DeliveryState::Delivered);
    }
}
