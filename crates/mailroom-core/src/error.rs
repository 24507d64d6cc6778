//! Error types for the core library.

use thiserror::Error;

use crate::account::{AccountManagerError, CredentialError, UserId};
use crate::api::ApiError;
use crate::attachments::AttachmentError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Login or token exchange failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailroom_oauth::Error),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The user has no mailbox; such a user cannot stay logged in.
    #[error("No mailbox is attached to this user")]
    NoMailbox,

    /// An operation needs a current account and there is none.
    #[error("No account is selected")]
    NoCurrentAccount,

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal consistency check of the account manager.
    #[error(transparent)]
    Manager(#[from] AccountManagerError),

    /// Attachment handling failed.
    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
