//! Email channel senders.
//!
//! The orchestrator only sees [`EmailSender`]; which implementation is wired
//! depends on whether a relay endpoint is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use notifyhub_core::config::EmailConfig;
use notifyhub_core::error::{AppError, ErrorKind};
use notifyhub_core::result::AppResult;
use notifyhub_core::traits::{EmailMessage, EmailSender};

/// Posts each email as JSON to an HTTP relay. Any non-2xx answer is a failure.
#[derive(Debug, Clone)]
pub struct HttpEmailSender {
    url: String,
    client: reqwest::Client,
}

impl HttpEmailSender {
    /// Creates a sender for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Returns the relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::ExternalService, "Email relay unreachable", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external(format!("Email relay returned HTTP {status}")));
        }

        debug!(to = %message.to, status = %status, "Email accepted by relay");
        Ok(())
    }
}

/// Logs emails instead of sending them. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> AppResult<()> {
        info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            "Email (log only)"
        );
        Ok(())
    }
}

/// Build the email sender described by `config`.
pub fn build_email_sender(config: &EmailConfig) -> AppResult<Arc<dyn EmailSender>> {
    match &config.relay_url {
        Some(url) => {
            let sender =
                HttpEmailSender::new(url, Duration::from_millis(config.request_timeout_ms))?;
            info!(relay = %sender.url(), "Email relay configured");
            Ok(Arc::new(sender))
        }
        None => {
            info!("No email relay configured, emails will be logged");
            Ok(Arc::new(LogEmailSender))
        }
    }
}
