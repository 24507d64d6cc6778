//! Account model types.

use serde::{Deserialize, Serialize};

use crate::mailbox::MailboxId;

/// Unique identifier of a logged-in user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Profile of a user as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub id: UserId,
    /// Display name.
    #[serde(default)]
    pub display_name: String,
    /// Login email.
    pub email: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A logged-in user.
///
/// The token itself lives in the token store, keyed by the same user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owning user.
    pub user_id: UserId,
    /// Last fetched profile.
    pub user: Option<UserProfile>,
}

impl Account {
    /// Create an account without a profile yet.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            user: None,
        }
    }

    /// Name to show for this account.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.user.as_ref().map_or_else(
            || self.user_id.to_string(),
            |user| {
                if user.display_name.is_empty() {
                    user.email.clone()
                } else {
                    user.display_name.clone()
                }
            },
        )
    }
}

/// Current account and mailbox selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected user, if any.
    pub user_id: Option<UserId>,
    /// Selected mailbox, [`MailboxId::NONE`] when there is none.
    pub mailbox_id: MailboxId,
}

/// Events the account manager broadcasts to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    /// The active account was logged out because its token could not be refreshed.
    Disconnected(UserId),
    /// An account and all of its local data were removed.
    AccountRemoved(UserId),
    /// The current mailbox changed.
    CurrentMailboxChanged {
        /// Owner of the mailbox.
        user_id: UserId,
        /// New mailbox, [`MailboxId::NONE`] when no mailbox is left.
        mailbox_id: MailboxId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display() {
        assert_eq!(UserId::new(123).to_string(), "123");
    }

    #[test]
    fn test_display_name_falls_back() {
        let mut account = Account::new(UserId::new(7));
        assert_eq!(account.display_name(), "7");

        account.user = Some(UserProfile {
            id: UserId::new(7),
            display_name: String::new(),
            email: "jane@example.com".into(),
            avatar: None,
        });
        assert_eq!(account.display_name(), "jane@example.com");

        if let Some(user) = account.user.as_mut() {
            user.display_name = "Jane".into();
        }
        assert_eq!(account.display_name(), "Jane");
    }
}
