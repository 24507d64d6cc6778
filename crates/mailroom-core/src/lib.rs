//! # mailroom-core
//!
//! Account, mailbox and contact synchronization core for the mailroom email
//! client.
//!
//! This crate provides:
//! - **Account management** - login, token lifecycle, account and mailbox selection
//! - **Per-user and per-mailbox runtime objects** - memoized API fetchers,
//!   contact managers and mailbox managers
//! - **Mailbox metadata refresh** - concurrent, best-effort permission/quota sync
//! - **Contact merge** - reconciles the remote directory with device contacts
//! - **Draft attachments** - placeholder creation, import, upload tracking
//!
//! The UI only talks to [`AccountManager`]; everything else hangs off it.
//! Remote calls, token storage, device contacts and push subscriptions are
//! injected as trait objects so each of them can be replaced.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod api;
pub mod attachments;
pub mod config;
pub mod contacts;
mod error;
pub mod mailbox;
pub mod push;
mod store;

pub use account::{
    Account, AccountEvent, AccountManager, AccountManagerError, AccountRepository, Collaborators,
    CredentialError, CredentialResult, KeyringTokenStore, MemoryTokenStore, Selection, TokenStore,
    UserId, UserProfile,
};
pub use api::{
    ApiError, ApiFetcher, ApiResult, Authenticator, HttpMailApi, MailApi, ProgressCallback,
    RefreshTokenDelegate,
};
pub use attachments::{
    Attachment, AttachmentDisposition, AttachmentError, AttachmentResolver, AttachmentSource,
    AttachmentTask, AttachmentsManagerWorker, FileAttachmentResolver, ImportOutcome,
    ResolvedAttachment,
};
pub use config::{CoreConfig, ExecutionContext};
pub use contacts::{
    AddressBook, Comparator, ContactManager, ContactOrigin, DeviceContactSource, GroupContact,
    InMemoryContactSource, LocalContact, MergedContact, NewContact, RemoteContact,
};
pub use error::{Error, Result};
pub use mailbox::{
    Draft, ExternalMailInfo, Folder, FolderRole, Mailbox, MailboxId, MailboxInfoRepository,
    MailboxManager, MailboxPermissions, Quotas,
};
pub use push::{LocalPushRegistry, PushNotificationService, Subscription};
pub use store::StoreLocation;
