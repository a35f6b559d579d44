//! Handshake credential verification collaborator.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::UserId;

/// Verifies a bearer credential and yields the subject it was issued to.
///
/// Implementations return an `Authentication` error for missing, malformed,
/// expired or revoked credentials.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return its subject.
    async fn verify(&self, token: &str) -> AppResult<UserId>;
}
