//! Mailbox model types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::UserId;
use crate::attachments::Attachment;

/// Identifier of a mailbox, unique per user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailboxId(pub i64);

impl MailboxId {
    /// Sentinel meaning "no mailbox selected".
    pub const NONE: Self = Self(0);

    /// Create a new mailbox ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns true for the "no mailbox" sentinel.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl std::fmt::Display for MailboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

const fn default_true() -> bool {
    true
}

/// A mail account belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    /// Mailbox id.
    pub mailbox_id: MailboxId,
    /// Owning user; filled in locally, the API does not send it.
    #[serde(default)]
    pub user_id: UserId,
    /// Remote uuid used in API paths.
    pub uuid: String,
    /// Email address.
    pub email: String,
    /// Local part of the address, as the hosting knows it.
    #[serde(rename = "mailbox")]
    pub local_part: String,
    /// Mail hosting product id.
    pub hosting_id: i64,
    /// Primary mailbox of the user.
    #[serde(default)]
    pub is_primary: bool,
    /// Whether the stored password still works.
    #[serde(default = "default_true")]
    pub is_password_valid: bool,
    /// Locked by the hosting (unpaid, abuse, ...).
    #[serde(default)]
    pub is_locked: bool,
    /// Storage is limited; quotas are worth fetching.
    #[serde(default)]
    pub is_limited: bool,
    /// Permissions, once fetched.
    #[serde(default)]
    pub permissions: Option<MailboxPermissions>,
    /// External mail flag, once fetched.
    #[serde(default)]
    pub external_mail_flag: Option<ExternalMailInfo>,
    /// Quotas, once fetched (limited mailboxes only).
    #[serde(default)]
    pub quotas: Option<Quotas>,
}

impl Mailbox {
    /// Composite key of a mailbox across users.
    #[must_use]
    pub fn object_id_for(mailbox_id: MailboxId, user_id: UserId) -> String {
        format!("{mailbox_id}_{user_id}")
    }

    /// Composite key of this mailbox.
    #[must_use]
    pub fn object_id(&self) -> String {
        Self::object_id_for(self.mailbox_id, self.user_id)
    }

    /// A mailbox can be opened when its password works and it is not locked.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.is_password_valid && !self.is_locked
    }

    /// Push notification topic of this mailbox.
    #[must_use]
    pub fn notification_topic_name(&self) -> String {
        format!("mailbox-{}", self.mailbox_id)
    }
}

/// What the user may do with a mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxPermissions {
    /// Can manage filters.
    pub can_manage_filters: bool,
    /// Can manage security settings.
    pub can_manage_security: bool,
    /// Can manage aliases.
    pub can_manage_aliases: bool,
    /// Can manage redirections.
    pub can_manage_redirections: bool,
    /// Can manage signatures.
    pub can_manage_signatures: bool,
    /// Can restrict senders.
    pub can_restrict_sender: bool,
}

/// Whether mail from outside the organisation is flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMailInfo {
    /// Flag enabled.
    #[serde(rename = "external_mail_flag_enabled", default)]
    pub is_enabled: bool,
    /// Domains considered internal.
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Storage usage of a limited mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    /// Used size in bytes.
    pub size: i64,
    /// When the size was computed (Unix seconds).
    #[serde(default)]
    pub size_checked_at: i64,
}

/// Well-known folder roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FolderRole {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Draft,
    /// Spam/junk folder.
    Spam,
    /// Trash folder.
    Trash,
    /// Archive folder.
    Archive,
}

impl FolderRole {
    /// Guess a role from a folder name when the server sends none.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            Some(Self::Inbox)
        } else if lower.contains("sent") {
            Some(Self::Sent)
        } else if lower.contains("draft") {
            Some(Self::Draft)
        } else if lower.contains("trash") || lower.contains("deleted") {
            Some(Self::Trash)
        } else if lower.contains("spam") || lower.contains("junk") {
            Some(Self::Spam)
        } else if lower.contains("archive") {
            Some(Self::Archive)
        } else {
            None
        }
    }

    /// Stable name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Sent => "SENT",
            Self::Draft => "DRAFT",
            Self::Spam => "SPAM",
            Self::Trash => "TRASH",
            Self::Archive => "ARCHIVE",
        }
    }

    /// Parse a stored role name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Inbox,
            Self::Sent,
            Self::Draft,
            Self::Spam,
            Self::Trash,
            Self::Archive,
        ]
        .into_iter()
        .find(|role| role.as_str() == value)
    }
}

/// A folder of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Remote folder id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Full path (including hierarchy).
    #[serde(default)]
    pub path: String,
    /// Role, if this is a well-known folder.
    #[serde(default)]
    pub role: Option<FolderRole>,
    /// Unread messages.
    #[serde(default)]
    pub unread_count: u32,
    /// Sync cursor; absent until the folder has been synced once.
    #[serde(default)]
    pub cursor: Option<String>,
}

impl Folder {
    /// Role sent by the server, or guessed from the name.
    #[must_use]
    pub fn effective_role(&self) -> Option<FolderRole> {
        self.role.or_else(|| FolderRole::from_name(&self.name))
    }
}

/// A draft being composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Local identity of the draft.
    pub local_uuid: Uuid,
    /// Subject.
    pub subject: String,
    /// Body.
    pub body: String,
    /// Attachments, embedded in the draft.
    pub attachments: Vec<Attachment>,
}

impl Draft {
    /// Create an empty draft.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local_uuid: Uuid::new_v4(),
            subject: String::new(),
            body: String::new(),
            attachments: Vec::new(),
        }
    }

    /// Summed size of the attachments in bytes.
    #[must_use]
    pub fn attachments_size(&self) -> u64 {
        self.attachments.iter().map(|a| a.size).sum()
    }
}

impl Default for Draft {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mailbox_json() -> &'static str {
        r#"{"mailbox_id":3,"uuid":"abc","email":"jane@ik.me","mailbox":"jane","hosting_id":77,
            "is_primary":true,"is_limited":true}"#
    }

    #[test]
    fn test_mailbox_from_api_json() {
        let mailbox: Mailbox = serde_json::from_str(mailbox_json()).unwrap();
        assert_eq!(mailbox.mailbox_id, MailboxId::new(3));
        assert_eq!(mailbox.user_id, UserId::default());
        assert_eq!(mailbox.local_part, "jane");
        assert!(mailbox.is_available());
        assert!(mailbox.permissions.is_none());
    }

    #[test]
    fn test_object_id_and_topic() {
        let mut mailbox: Mailbox = serde_json::from_str(mailbox_json()).unwrap();
        mailbox.user_id = UserId::new(10);
        assert_eq!(mailbox.object_id(), "3_10");
        assert_eq!(mailbox.notification_topic_name(), "mailbox-3");
    }

    #[test]
    fn test_locked_mailbox_is_unavailable() {
        let mut mailbox: Mailbox = serde_json::from_str(mailbox_json()).unwrap();
        mailbox.is_locked = true;
        assert!(!mailbox.is_available());
        mailbox.is_locked = false;
        mailbox.is_password_valid = false;
        assert!(!mailbox.is_available());
    }

    #[test]
    fn test_none_sentinel() {
        assert!(MailboxId::NONE.is_none());
        assert!(MailboxId::default().is_none());
        assert!(!MailboxId::new(1).is_none());
    }

    #[test]
    fn test_folder_roles() {
        assert_eq!(FolderRole::from_name("INBOX"), Some(FolderRole::Inbox));
        assert_eq!(FolderRole::from_name("Sent Items"), Some(FolderRole::Sent));
        assert_eq!(FolderRole::from_name("Deleted"), Some(FolderRole::Trash));
        assert_eq!(FolderRole::from_name("Projects"), None);
        assert_eq!(FolderRole::parse("DRAFT"), Some(FolderRole::Draft));
        assert_eq!(FolderRole::parse("draft"), None);
    }

    #[test]
    fn test_folder_role_from_server_wins() {
        let folder: Folder =
            serde_json::from_str(r#"{"id":"f1","name":"Boîte","role":"INBOX"}"#).unwrap();
        assert_eq!(folder.effective_role(), Some(FolderRole::Inbox));
        assert!(folder.cursor.is_none());
    }
}
