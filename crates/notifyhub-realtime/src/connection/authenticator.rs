//! Handshake authentication: verifies the bearer credential presented at connect time.

use std::sync::Arc;

use notifyhub_core::error::AppError;
use notifyhub_core::traits::TokenVerifier;
use notifyhub_core::types::UserId;

/// Authenticates connection handshakes through the token verifier collaborator.
#[derive(Clone)]
pub struct HandshakeAuthenticator {
    verifier: Arc<dyn TokenVerifier>,
}

impl std::fmt::Debug for HandshakeAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeAuthenticator").finish()
    }
}

impl HandshakeAuthenticator {
    /// Creates a new authenticator.
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Verifies the credential and returns its subject.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserId, AppError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::authentication("Missing bearer credential"))?;
        self.verifier.verify(token).await
    }
}
