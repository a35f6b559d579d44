//! Notification priority levels.

use serde::{Deserialize, Serialize};

/// Priority of a notification. Drives the acknowledgment window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Time-sensitive; shortest acknowledgment window.
    High,
    /// Standard events.
    #[default]
    Medium,
    /// Background events; longest acknowledgment window.
    Low,
}

impl Priority {
    /// Return the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
