//! Reconciliation of remote and device contacts.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;

use super::model::{MergedContact, RemoteContact};
use super::source::DeviceContactSource;
use crate::Result;

/// Remote contacts indexed by merged-contact id.
///
/// A contact with several emails appears once per email. When two contacts
/// produce the same id the first one is kept; it only borrows the avatar of
/// the later one if it has none.
struct RemoteIndex {
    entries: HashMap<String, (String, RemoteContact)>,
    order: Vec<String>,
}

impl RemoteIndex {
    fn build(contacts: Vec<RemoteContact>) -> Self {
        let mut entries: HashMap<String, (String, RemoteContact)> = HashMap::new();
        let mut order = Vec::new();

        for contact in contacts {
            for email in contact.emails.iter().filter(|e| !e.is_empty()) {
                let id = MergedContact::compute_id(email, &contact.name);
                match entries.entry(id) {
                    Entry::Occupied(mut kept) => {
                        let kept = &mut kept.get_mut().1;
                        if kept.avatar.is_none() {
                            kept.avatar.clone_from(&contact.avatar);
                        }
                    }
                    Entry::Vacant(slot) => {
                        order.push(slot.key().clone());
                        slot.insert((email.clone(), contact.clone()));
                    }
                }
            }
        }

        Self { entries, order }
    }

    fn get(&self, id: &str) -> Option<&RemoteContact> {
        self.entries.get(id).map(|(_, contact)| contact)
    }
}

/// Computes the full merged contact set.
///
/// Returns `None` if `cancel` fires during the enumeration of device
/// contacts. Nothing is written here; the caller commits the result.
pub(crate) fn merge_contacts(
    remote_contacts: Vec<RemoteContact>,
    device: &dyn DeviceContactSource,
    cancel: &CancellationToken,
) -> Result<Option<Vec<MergedContact>>> {
    let mut index = RemoteIndex::build(remote_contacts);
    let mut unmerged: HashSet<String> = index.entries.keys().cloned().collect();
    let mut merged: Vec<MergedContact> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut cancelled = false;

    device.enumerate_contacts(&mut |local, stop| {
        if cancel.is_cancelled() {
            cancelled = true;
            *stop = true;
            return;
        }

        let name = local.full_name();
        for email in local.emails.iter().filter(|e| !e.is_empty()) {
            let id = MergedContact::compute_id(email, &name);
            if !seen.insert(id.clone()) {
                continue;
            }
            let remote = index.get(&id).cloned();
            unmerged.remove(&id);
            merged.push(MergedContact::from_local(email, local.clone(), remote));
        }
    })?;

    if cancelled || cancel.is_cancelled() {
        return Ok(None);
    }

    for id in std::mem::take(&mut index.order) {
        if !unmerged.contains(&id) {
            continue;
        }
        if let Some((email, remote)) = index.entries.remove(&id) {
            merged.push(MergedContact::from_remote(&email, remote));
        }
    }

    Ok(Some(merged))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contacts::{InMemoryContactSource, LocalContact};

    fn remote(id: &str, name: &str, emails: &[&str], avatar: Option<&str>) -> RemoteContact {
        RemoteContact {
            id: id.into(),
            name: name.into(),
            emails: emails.iter().map(ToString::to_string).collect(),
            avatar: avatar.map(Into::into),
            address_book_id: None,
        }
    }

    fn local(id: &str, given: &str, family: &str, emails: &[&str]) -> LocalContact {
        LocalContact {
            identifier: id.into(),
            given_name: given.into(),
            family_name: family.into(),
            emails: emails.iter().map(ToString::to_string).collect(),
        }
    }

    fn run(remotes: Vec<RemoteContact>, locals: Vec<LocalContact>) -> Vec<MergedContact> {
        let source = InMemoryContactSource::new(locals);
        merge_contacts(remotes, &source, &CancellationToken::new())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_local_and_remote_with_same_id_merge() {
        let merged = run(
            vec![remote("r1", "A X", &["a@x.com"], None)],
            vec![local("l1", "A", "X", &["a@x.com"])],
        );
        assert_eq!(merged.len(), 1);
        assert!(merged[0].local().is_some());
        assert!(merged[0].remote().is_some());
    }

    #[test]
    fn test_one_entry_per_email() {
        let merged = run(
            vec![remote("r1", "Multi", &["a@x.com", "b@x.com"], None)],
            vec![local("l1", "Solo", "", &["c@x.com", "d@x.com"])],
        );
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_duplicate_remote_keeps_first_and_borrows_avatar() {
        let merged = run(
            vec![
                remote("first", "A", &["a@x.com"], None),
                remote("second", "A", &["a@x.com"], Some("https://avatar")),
            ],
            vec![],
        );
        assert_eq!(merged.len(), 1);
        let kept = merged[0].remote().unwrap();
        assert_eq!(kept.id, "first");
        assert_eq!(kept.avatar.as_deref(), Some("https://avatar"));
    }

    #[test]
    fn test_name_case_is_significant() {
        let merged = run(
            vec![remote("r1", "a x", &["a@x.com"], None)],
            vec![local("l1", "A", "X", &["a@x.com"])],
        );
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|c| c.local().is_none() || c.remote().is_none()));
    }

    #[test]
    fn test_contacts_without_email_are_ignored() {
        let merged = run(vec![remote("r1", "Nobody", &[], None)], vec![local("l1", "No", "Mail", &[])]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_cancelled_enumeration_yields_nothing() {
        let source = InMemoryContactSource::new(vec![local("l1", "A", "X", &["a@x.com"])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = merge_contacts(vec![], &source, &cancel).unwrap();
        assert!(outcome.is_none());
    }
}
