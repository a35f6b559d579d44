//! Handshake credential verification configuration.

use serde::{Deserialize, Serialize};

/// Token verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret key for JWT verification (HMAC-SHA256).
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Clock skew tolerance in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
    /// Lifetime of tokens issued by the development encoder, in minutes.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_minutes: u64,
    /// Maximum number of revoked token ids kept in memory.
    #[serde(default = "default_revocation_capacity")]
    pub revocation_capacity: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            leeway_seconds: default_leeway(),
            access_ttl_minutes: default_access_ttl(),
            revocation_capacity: default_revocation_capacity(),
        }
    }
}

fn default_jwt_secret() -> String {
    "CHANGE_ME_IN_PRODUCTION".to_string()
}

fn default_leeway() -> u64 {
    5
}

fn default_access_ttl() -> u64 {
    15
}

fn default_revocation_capacity() -> u64 {
    100_000
}
