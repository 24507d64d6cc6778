//! Internal consistency errors of the account manager.
//!
//! These are logged where they occur; the UI never has to render them.

use super::UserId;
use crate::mailbox::MailboxId;

/// Something the account manager expected to exist did not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountManagerError {
    /// No mailbox manager could be built (no token for the user).
    #[error("No mailbox manager for mailbox {mailbox_id} of user {user_id}")]
    MissingMailboxManager {
        /// Owner.
        user_id: UserId,
        /// Mailbox.
        mailbox_id: MailboxId,
    },

    /// The inbox of the mailbox was never synced.
    #[error("Inbox of mailbox {0} is missing or was never synced")]
    MissingFolder(MailboxId),

    /// The mailbox is not known locally.
    #[error("Mailbox {mailbox_id} of user {user_id} not found")]
    MissingMailbox {
        /// Owner.
        user_id: UserId,
        /// Mailbox.
        mailbox_id: MailboxId,
    },

    /// The user has no push subscription yet.
    #[error("No push subscription for user {0}")]
    MissingSubscription(UserId),

    /// The subscription already contains the topic.
    #[error("Already subscribed to {0}")]
    TopicAlreadyPresent(String),

    /// No API fetcher could be built (no token for the user).
    #[error("No API fetcher for user {0}")]
    MissingApiFetcher(UserId),

    /// There was no token to remove.
    #[error("No token to remove for user {0}")]
    TokenRemoval(UserId),

    /// The token store failed to delete the token.
    #[error("Failed to delete token of user {user_id}: {reason}")]
    TokenDeletion {
        /// Owner.
        user_id: UserId,
        /// Store error.
        reason: String,
    },
}
