//! Contact model types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A contact from the device address book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalContact {
    /// Identifier assigned by the device.
    pub identifier: String,
    /// Given name.
    #[serde(default)]
    pub given_name: String,
    /// Family name.
    #[serde(default)]
    pub family_name: String,
    /// Email addresses.
    #[serde(default)]
    pub emails: Vec<String>,
}

impl LocalContact {
    /// Given and family name joined by a space.
    #[must_use]
    pub fn full_name(&self) -> String {
        match (self.given_name.trim(), self.family_name.trim()) {
            ("", family) => family.to_string(),
            (given, "") => given.to_string(),
            (given, family) => format!("{given} {family}"),
        }
    }
}

/// A contact from the remote directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContact {
    /// Remote id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email addresses.
    #[serde(default)]
    pub emails: Vec<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Address book holding the contact.
    #[serde(default, rename = "addressbook_id")]
    pub address_book_id: Option<i64>,
}

/// Contact group of an address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupContact {
    /// Remote id.
    pub id: i64,
    /// Group name.
    pub name: String,
    /// Owning address book.
    #[serde(default)]
    pub address_book_id: i64,
}

/// Remote address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    /// Remote id.
    pub id: i64,
    /// Remote UUID.
    #[serde(default)]
    pub uuid: String,
    /// Name.
    pub name: String,
    /// Whether new contacts go here by default.
    #[serde(default)]
    pub is_default: bool,
    /// Groups of this address book.
    #[serde(default, rename = "categories")]
    pub groups: Vec<GroupContact>,
}

/// Contact to create remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    /// Email address.
    pub email: String,
    /// Display name, may be empty.
    pub name: String,
}

/// Where a merged contact comes from. At least one side is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactOrigin {
    /// Only on the device.
    Local(LocalContact),
    /// Only in the remote directory.
    Remote(RemoteContact),
    /// Both sides produce the same id.
    Both {
        /// Device side.
        local: LocalContact,
        /// Remote side.
        remote: RemoteContact,
    },
}

/// A device contact and/or a remote contact reconciled under one id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedContact {
    /// Identity computed from `(email, name)`.
    pub id: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Backing contacts.
    pub origin: ContactOrigin,
}

impl MergedContact {
    /// Identity of the contact reachable through `email` under `name`.
    ///
    /// Both parts are compared exactly: names differing only in case give
    /// different ids.
    #[must_use]
    pub fn compute_id(email: &str, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(email.as_bytes());
        hasher.update([0]);
        hasher.update(name.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Merge a device contact with its remote match, if any.
    #[must_use]
    pub fn from_local(email: &str, local: LocalContact, remote: Option<RemoteContact>) -> Self {
        let name = local.full_name();
        let origin = match remote {
            Some(remote) => ContactOrigin::Both { local, remote },
            None => ContactOrigin::Local(local),
        };
        Self {
            id: Self::compute_id(email, &name),
            email: email.to_string(),
            name,
            origin,
        }
    }

    /// A remote contact without device counterpart.
    #[must_use]
    pub fn from_remote(email: &str, remote: RemoteContact) -> Self {
        Self {
            id: Self::compute_id(email, &remote.name),
            email: email.to_string(),
            name: remote.name.clone(),
            origin: ContactOrigin::Remote(remote),
        }
    }

    /// Device side, if any.
    #[must_use]
    pub const fn local(&self) -> Option<&LocalContact> {
        match &self.origin {
            ContactOrigin::Local(local) | ContactOrigin::Both { local, .. } => Some(local),
            ContactOrigin::Remote(_) => None,
        }
    }

    /// Remote side, if any.
    #[must_use]
    pub const fn remote(&self) -> Option<&RemoteContact> {
        match &self.origin {
            ContactOrigin::Remote(remote) | ContactOrigin::Both { remote, .. } => Some(remote),
            ContactOrigin::Local(_) => None,
        }
    }

    /// Avatar of the remote side.
    #[must_use]
    pub fn avatar(&self) -> Option<&str> {
        self.remote().and_then(|remote| remote.avatar.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_full_name_skips_empty_parts() {
        let mut contact = LocalContact {
            given_name: "Ada".into(),
            family_name: "Lovelace".into(),
            ..LocalContact::default()
        };
        assert_eq!(contact.full_name(), "Ada Lovelace");
        contact.family_name.clear();
        assert_eq!(contact.full_name(), "Ada");
        contact.given_name.clear();
        assert_eq!(contact.full_name(), "");
    }

    #[test]
    fn test_id_is_case_sensitive_on_name() {
        assert_ne!(
            MergedContact::compute_id("a@x.com", "A X"),
            MergedContact::compute_id("a@x.com", "a x")
        );
    }

    #[test]
    fn test_id_parts_do_not_run_together() {
        assert_ne!(
            MergedContact::compute_id("a@x.co", "m"),
            MergedContact::compute_id("a@x.com", "")
        );
    }

    #[test]
    fn test_merged_sides() {
        let remote = RemoteContact {
            id: "r1".into(),
            name: "A X".into(),
            emails: vec!["a@x.com".into()],
            avatar: Some("https://avatar".into()),
            address_book_id: Some(1),
        };
        let merged = MergedContact::from_remote("a@x.com", remote);
        assert!(merged.local().is_none());
        assert_eq!(merged.avatar(), Some("https://avatar"));
    }

    proptest! {
        #[test]
        fn test_compute_id_is_deterministic(email in ".{0,40}", name in ".{0,40}") {
            let first = MergedContact::compute_id(&email, &name);
            prop_assert_eq!(first.len(), 64);
            prop_assert_eq!(first, MergedContact::compute_id(&email, &name));
        }
    }
}
