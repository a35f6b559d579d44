//! JWT token validation and revocation checking.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use moka::future::Cache;
use tracing::debug;
use uuid::Uuid;

use notifyhub_core::config::AuthConfig;
use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_core::traits::TokenVerifier;
use notifyhub_core::types::UserId;

use super::claims::Claims;

/// Minimum time a revoked id is remembered.
const MIN_REVOCATION_TTL: Duration = Duration::from_secs(60);

/// Validates JWT tokens and checks the revocation list.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
    /// Revoked token ids.
    revoked: Cache<Uuid, ()>,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .field("revoked", &self.revoked.entry_count())
            .finish()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        // A revoked id only matters until the token would have expired anyway.
        let ttl = Duration::from_secs(config.access_ttl_minutes.saturating_mul(60))
            .max(MIN_REVOCATION_TTL);
        let revoked = Cache::builder()
            .max_capacity(config.revocation_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            revoked,
        }
    }

    /// Decodes and validates a token string.
    ///
    /// Checks the signature, the expiration, and the revocation list.
    pub async fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.decode_token(token)?;
        if self.revoked.get(&claims.jti).await.is_some() {
            return Err(AppError::authentication("Token has been revoked"));
        }
        Ok(claims)
    }

    /// Adds a token id to the revocation list.
    pub async fn revoke(&self, jti: Uuid) {
        debug!(%jti, "Token revoked");
        self.revoked.insert(jti, ()).await;
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::authentication("Token has expired")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidToken => {
                        AppError::authentication("Invalid token format")
                    }
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AppError::authentication("Invalid token signature")
                    }
                    _ => AppError::authentication(format!("Token validation failed: {e}")),
                }
            })?;

        Ok(token_data.claims)
    }
}

#[async_trait]
impl TokenVerifier for JwtDecoder {
    async fn verify(&self, token: &str) -> AppResult<UserId> {
        if token.is_empty() {
            return Err(AppError::authentication("Missing token"));
        }
        Ok(self.decode(token).await?.user_id())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use notifyhub_core::error::ErrorKind;

    use super::*;
    use crate::jwt::JwtEncoder;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            leeway_seconds: 0,
            ..AuthConfig::default()
        }
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject() {
        let user = UserId::new();
        let token = JwtEncoder::new(&config()).issue(user).unwrap();
        let decoder = JwtDecoder::new(&config());
        assert_eq!(decoder.verify(&token).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let token = JwtEncoder::new(&config()).issue(UserId::new()).unwrap();
        let other = AuthConfig {
            jwt_secret: "other".into(),
            ..config()
        };
        let err = JwtDecoder::new(&other).verify(&token).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: UserId::new(),
            iat: now - 3600,
            exp: now - 600,
            jti: Uuid::new_v4(),
        };
        let token = JwtEncoder::new(&config()).issue_with_claims(&claims).unwrap();
        let err = JwtDecoder::new(&config()).verify(&token).await.unwrap_err();
        assert!(err.message.contains("expired"));
    }

    #[tokio::test]
    async fn test_revoked_token_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: UserId::new(),
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4(),
        };
        let token = JwtEncoder::new(&config()).issue_with_claims(&claims).unwrap();
        let decoder = JwtDecoder::new(&config());
        assert!(decoder.verify(&token).await.is_ok());

        decoder.revoke(claims.jti).await;
        let err = decoder.verify(&token).await.unwrap_err();
        assert!(err.message.contains("revoked"));
    }

    #[tokio::test]
    async fn test_garbage_and_empty_rejected() {
        let decoder = JwtDecoder::new(&config());
        assert!(decoder.verify("not-a-jwt").await.is_err());
        assert!(decoder.verify("").await.is_err());
    }
}
