//! Device address book access.

use std::sync::RwLock;

use super::model::LocalContact;
use crate::Result;

/// The device's own address book.
///
/// Enumeration is push-based so large address books never need to be
/// loaded at once: `visitor` receives one contact at a time and sets the
/// flag to `true` to stop early.
pub trait DeviceContactSource: Send + Sync {
    /// Calls `visitor` for every device contact until it asks to stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the address book cannot be read.
    fn enumerate_contacts(&self, visitor: &mut dyn FnMut(LocalContact, &mut bool)) -> Result<()>;
}

/// Device contacts held in memory.
#[derive(Debug, Default)]
pub struct InMemoryContactSource {
    contacts: RwLock<Vec<LocalContact>>,
}

impl InMemoryContactSource {
    /// Create a source serving `contacts`.
    #[must_use]
    pub fn new(contacts: Vec<LocalContact>) -> Self {
        Self {
            contacts: RwLock::new(contacts),
        }
    }

    /// Replace the served contacts.
    pub fn set_contacts(&self, contacts: Vec<LocalContact>) {
        *self
            .contacts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = contacts;
    }
}

impl DeviceContactSource for InMemoryContactSource {
    fn enumerate_contacts(&self, visitor: &mut dyn FnMut(LocalContact, &mut bool)) -> Result<()> {
        let contacts = self
            .contacts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stop = false;
        for contact in contacts.iter() {
            visitor(contact.clone(), &mut stop);
            if stop {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn contact(id: &str) -> LocalContact {
        LocalContact {
            identifier: id.into(),
            ..LocalContact::default()
        }
    }

    #[test]
    fn test_visitor_can_stop_early() {
        let source = InMemoryContactSource::new(vec![contact("1"), contact("2"), contact("3")]);
        let mut seen = Vec::new();
        source
            .enumerate_contacts(&mut |contact, stop| {
                seen.push(contact.identifier);
                *stop = seen.len() == 2;
            })
            .unwrap();
        assert_eq!(seen, ["1", "2"]);
    }
}
