//! Outbound delivery of guest messages to a device owner's messaging account.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The messaging service refused the message.
    #[error("Recipient {recipient} rejected: {reason}")]
    Rejected { recipient: String, reason: String },

    #[error("Messaging service unavailable: {0}")]
    Unavailable(String),
}

/// Push-message collaborator. The transport behind it lives outside this workspace.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError>;
}
