//! Runtime object of one mailbox.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Draft, Folder, FolderRole, Mailbox};
use super::store::MailboxStore;
use crate::Result;
use crate::account::UserId;
use crate::api::ApiFetcher;
use crate::attachments::{Attachment, AttachmentError};
use crate::contacts::ContactManager;
use crate::store::StoreLocation;

/// Everything needed to operate one `(user, mailbox)` pair.
///
/// Obtained from [`AccountManager::get_mailbox_manager`](crate::AccountManager::get_mailbox_manager),
/// which hands out the same instance for the same pair.
#[derive(Debug)]
pub struct MailboxManager {
    mailbox: Mailbox,
    api_fetcher: Arc<ApiFetcher>,
    contact_manager: Arc<ContactManager>,
    store: MailboxStore,
}

impl MailboxManager {
    /// Create a manager for `mailbox`; its store is opened on first use.
    #[must_use]
    pub fn new(
        location: StoreLocation,
        mailbox: Mailbox,
        api_fetcher: Arc<ApiFetcher>,
        contact_manager: Arc<ContactManager>,
    ) -> Self {
        let store = MailboxStore::new(location, mailbox.user_id, mailbox.mailbox_id);
        Self {
            mailbox,
            api_fetcher,
            contact_manager,
            store,
        }
    }

    /// The managed mailbox.
    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Owner of the mailbox.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.mailbox.user_id
    }

    /// API access of the owner.
    #[must_use]
    pub const fn api_fetcher(&self) -> &Arc<ApiFetcher> {
        &self.api_fetcher
    }

    /// Contacts of the owner.
    #[must_use]
    pub const fn contact_manager(&self) -> &Arc<ContactManager> {
        &self.contact_manager
    }

    /// Fetches and stores the folder list.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch or the store fails.
    pub async fn refresh_folders(&self) -> Result<Vec<Folder>> {
        let mailbox = &self.mailbox;
        let folders = self
            .api_fetcher
            .perform(|api, token| async move { api.folders(&token, mailbox).await })
            .await?;
        self.store.replace_folders(&folders).await?;
        info!(mailbox_id = %mailbox.mailbox_id, "Stored {} folder(s)", folders.len());
        self.store.folders().await
    }

    /// Stored folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn folders(&self) -> Result<Vec<Folder>> {
        self.store.folders().await
    }

    /// Stored folder with `role`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn folder(&self, role: FolderRole) -> Result<Option<Folder>> {
        self.store.folder(role).await
    }

    /// Records the sync cursor of a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn set_folder_cursor(&self, folder_id: &str, cursor: &str) -> Result<bool> {
        self.store.set_folder_cursor(folder_id, cursor).await
    }

    /// Creates and stores an empty draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn create_draft(&self) -> Result<Draft> {
        let draft = Draft::new();
        self.store.save_draft(&draft).await?;
        debug!(mailbox_id = %self.mailbox.mailbox_id, draft = %draft.local_uuid, "Draft created");
        Ok(draft)
    }

    /// Stores `draft`, replacing the stored one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn save_draft(&self, draft: &Draft) -> Result<()> {
        self.store.save_draft(draft).await
    }

    /// Stored draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn draft(&self, local_uuid: Uuid) -> Result<Option<Draft>> {
        self.store.draft(local_uuid).await
    }

    /// Sets the subject of a draft.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::DraftNotFound`] if there is no such draft.
    pub async fn set_draft_subject(&self, local_uuid: Uuid, subject: &str) -> Result<()> {
        if self.store.set_subject(local_uuid, subject).await? {
            Ok(())
        } else {
            Err(AttachmentError::DraftNotFound(local_uuid).into())
        }
    }

    pub(crate) async fn set_draft_subject_if_empty(&self, local_uuid: Uuid, subject: &str) -> Result<bool> {
        self.store.set_subject_if_empty(local_uuid, subject).await
    }

    /// Edits the attachment list of a draft in one transaction.
    pub(crate) async fn modify_attachments<R>(
        &self,
        draft_uuid: Uuid,
        edit: impl FnOnce(&mut Vec<Attachment>) -> R + Send,
    ) -> Result<R> {
        self.store
            .modify_attachments(draft_uuid, edit)
            .await?
            .ok_or_else(|| AttachmentError::DraftNotFound(draft_uuid).into())
    }

    /// Closes the store.
    pub async fn close(&self) {
        self.store.close().await;
    }
}
