//! Mailboxes, their folders and drafts.

mod manager;
mod model;
mod repository;
mod store;

pub use manager::MailboxManager;
pub use model::{
    Draft, ExternalMailInfo, Folder, FolderRole, Mailbox, MailboxId, MailboxPermissions, Quotas,
};
pub use repository::MailboxInfoRepository;
