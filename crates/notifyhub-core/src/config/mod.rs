//! Application configuration schemas.
//!
//! All configuration structs are deserialized through the `config` crate.
//! Every field carries a serde default so an empty source is a valid
//! configuration.

pub mod app;
pub mod auth;
pub mod delivery;
pub mod logging;
pub mod realtime;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::auth::AuthConfig;
pub use self::delivery::{DeliveryConfig, EmailConfig, RateLimitConfig};
pub use self::logging::LoggingConfig;
pub use self::realtime::{AckTimeoutConfig, RealtimeConfig};

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Handshake verification settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Connection registry settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Delivery orchestration settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files and the environment.
    ///
    /// Merges `config/default`, an environment-specific overlay
    /// `config/{env}`, and environment variables prefixed with `NOTIFYHUB__`
    /// (nested keys separated by `__`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("NOTIFYHUB")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.realtime.ping_interval_ms == 0 {
            return Err(AppError::configuration(
                "realtime.ping_interval_ms must be greater than zero",
            ));
        }
        if self.realtime.ping_timeout_ms == 0 {
            return Err(AppError::configuration(
                "realtime.ping_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.realtime.ack_timeouts.high_ms, 5_000);
        assert_eq!(config.realtime.ack_timeouts.medium_ms, 10_000);
        assert_eq!(config.realtime.ack_timeouts.low_ms, 15_000);
        assert_eq!(config.delivery.rate_limit.max_per_minute, 60);
        assert!(config.delivery.archive_on_failure);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = AppConfig::from_toml(
            r#"
            [realtime]
            max_connections = 2
            ping_interval_ms = 1000

            [delivery.email.retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.realtime.max_connections, 2);
        assert_eq!(
            config.realtime.stale_after(),
            std::time::Duration::from_millis(2000)
        );
        assert_eq!(config.delivery.email.retry.max_attempts, 5);
        assert_eq!(config.delivery.email.retry.base_backoff_ms, 1_000);
    }

    #[test]
    fn test_zero_ping_interval_is_rejected() {
        let err = AppConfig::from_toml("[realtime]\nping_interval_ms = 0").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
        assert!(err.message.contains("ping_interval_ms"));

        let err = AppConfig::from_toml("[realtime]\nping_timeout_ms = 0").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_zero_ping_interval_is_clamped_when_set_directly() {
        let mut config = AppConfig::default();
        config.realtime.ping_interval_ms = 0;
        assert_eq!(config.realtime.ping_interval(), std::time::Duration::from_millis(1));
        assert_eq!(config.realtime.stale_after(), std::time::Duration::from_millis(2));
    }
}
