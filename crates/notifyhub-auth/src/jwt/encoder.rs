//! JWT token creation.
//!
//! The engine only verifies tokens; issuing them belongs to the identity
//! service. The encoder exists for development setups and tests.

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use notifyhub_core::config::AuthConfig;
use notifyhub_core::error::AppError;
use notifyhub_core::types::UserId;

use super::claims::Claims;

/// Creates signed handshake tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    /// HMAC secret key for signing.
    encoding_key: EncodingKey,
    /// Token TTL in minutes.
    ttl_minutes: i64,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl_minutes: i64::try_from(config.access_ttl_minutes).unwrap_or(i64::MAX / 60),
        }
    }

    /// Issues a token for `user_id` with the configured lifetime.
    pub fn issue(&self, user_id: UserId) -> Result<String, AppError> {
        let now = Utc::now();
        self.issue_with_claims(&Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(self.ttl_minutes)).timestamp(),
            jti: Uuid::new_v4(),
        })
    }

    /// Signs arbitrary claims.
    pub fn issue_with_claims(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))
    }
}
