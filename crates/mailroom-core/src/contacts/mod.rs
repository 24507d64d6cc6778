//! Contacts: remote directory and device address book merged per user.

mod manager;
mod merge;
mod model;
mod repository;
mod search;
mod source;

pub use manager::ContactManager;
pub use model::{
    AddressBook, ContactOrigin, GroupContact, LocalContact, MergedContact, NewContact,
    RemoteContact,
};
pub use search::Comparator;
pub use source::{DeviceContactSource, InMemoryContactSource};
