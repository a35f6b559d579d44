//! Response envelopes.

use serde::{Deserialize, Serialize};

/// Standard success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Always `true`.
    pub success: bool,
    /// Payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap `data` in a success envelope.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"shutting_down"` once shutdown started.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Live connections.
    pub connections: usize,
    /// Users with at least one live connection.
    pub users: usize,
    /// Seconds since start.
    pub uptime_seconds: u64,
}
