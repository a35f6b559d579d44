//! Email channel collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::AppResult;
use crate::types::id::UserId;

/// A rendered email ready for hand-off to the sending channel.
///
/// The recipient is identified by user; address lookup is the channel's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient user.
    pub to: UserId,
    /// Sender address.
    pub from: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Sends rendered emails. A returned error counts as a failed attempt.
#[async_trait]
pub trait EmailSender: Send + Sync + std::fmt::Debug {
    /// Hand one message to the channel.
    async fn send(&self, message: &EmailMessage) -> AppResult<()>;
}
