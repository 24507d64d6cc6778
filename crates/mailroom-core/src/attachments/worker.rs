//! Attachment list of one draft.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AttachmentError;
use super::model::{Attachment, AttachmentDisposition, AttachmentSource, AttachmentTask, ImportOutcome};
use super::resolver::{AttachmentResolver, ResolvedAttachment};
use crate::api::ProgressCallback;
use crate::config::{CoreConfig, ExecutionContext};
use crate::mailbox::MailboxManager;
use crate::{Error, Result};

/// Manages the attachments of one draft.
///
/// Each attachment moves from placeholder, to resolved local file, to
/// uploaded. Its UUID stays the same throughout; every update replaces the
/// whole stored record matched by UUID.
pub struct AttachmentsManagerWorker {
    mailbox_manager: Arc<MailboxManager>,
    draft_uuid: Uuid,
    resolver: Arc<dyn AttachmentResolver>,
    context: ExecutionContext,
    max_attachments_size: u64,
    max_attachment_count: usize,
    tasks: Arc<DashMap<Uuid, AttachmentTask>>,
    uploads: DashMap<Uuid, AbortHandle>,
}

impl std::fmt::Debug for AttachmentsManagerWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentsManagerWorker")
            .field("draft_uuid", &self.draft_uuid)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl AttachmentsManagerWorker {
    /// Create a worker for the draft `draft_uuid` of `mailbox_manager`.
    #[must_use]
    pub fn new(
        config: &CoreConfig,
        mailbox_manager: Arc<MailboxManager>,
        draft_uuid: Uuid,
        resolver: Arc<dyn AttachmentResolver>,
    ) -> Self {
        Self {
            mailbox_manager,
            draft_uuid,
            resolver,
            context: config.context,
            max_attachments_size: config.max_attachments_size,
            max_attachment_count: config.max_attachment_count,
            tasks: Arc::new(DashMap::new()),
            uploads: DashMap::new(),
        }
    }

    /// The draft being edited.
    #[must_use]
    pub const fn draft_uuid(&self) -> Uuid {
        self.draft_uuid
    }

    /// Current attachments of the draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is missing or the store fails.
    pub async fn attachments(&self) -> Result<Vec<Attachment>> {
        self.mailbox_manager
            .modify_attachments(self.draft_uuid, |list| list.clone())
            .await
    }

    /// Adds a placeholder so the attachment shows up before any byte moves.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::CountLimitReached`] if the draft is full.
    pub async fn create_local_attachment(
        &self,
        name: &str,
        disposition: AttachmentDisposition,
    ) -> Result<Attachment> {
        let attachment = Attachment::local_placeholder(name, disposition);
        let limit = self.max_attachment_count;
        let added = self
            .mailbox_manager
            .modify_attachments(self.draft_uuid, {
                let attachment = attachment.clone();
                move |list| {
                    if list.len() >= limit {
                        return false;
                    }
                    list.push(attachment);
                    true
                }
            })
            .await?;
        if !added {
            return Err(AttachmentError::CountLimitReached { limit }.into());
        }

        self.tasks.insert(attachment.uuid, AttachmentTask::default());
        debug!(draft = %self.draft_uuid, attachment = %attachment.uuid, "Placeholder created");
        Ok(attachment)
    }

    /// Replaces the stored record of `uuid` with the resolved metadata.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::NotFound`] if the attachment was removed.
    pub async fn update_local_attachment(
        &self,
        uuid: Uuid,
        resolved: &ResolvedAttachment,
    ) -> Result<Attachment> {
        self.replace_attachment(uuid, |current| Attachment {
            uuid,
            part_id: None,
            name: resolved.name.clone(),
            mime_type: resolved.mime_type.clone(),
            size: resolved.size,
            disposition: current.disposition,
            content_id: current.content_id.clone(),
            local_path: Some(resolved.path.clone()),
        })
        .await
    }

    /// Imports `sources` concurrently.
    ///
    /// Only as many sources as free attachment slots are processed; the rest
    /// are reported as [`AttachmentError::CountLimitReached`]. In the share
    /// extension the first title found becomes the subject of a draft that
    /// has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is missing or the store fails.
    /// Failures of single sources are reported in the outcome.
    pub async fn import_attachments(&self, sources: Vec<AttachmentSource>) -> Result<ImportOutcome> {
        let used = self.attachments().await?.len();
        let free = self.max_attachment_count.saturating_sub(used);
        let skipped = sources.len().saturating_sub(free);

        let results = join_all(
            sources
                .into_iter()
                .take(free)
                .map(|source| self.process_new_attachment(source)),
        )
        .await;

        let mut outcome = ImportOutcome::default();
        for result in results {
            match result {
                Ok((attachment, title)) => {
                    if outcome.title.is_none() {
                        outcome.title = title;
                    }
                    outcome.imported.push(attachment);
                }
                Err(Error::Attachment(e)) => outcome.errors.push(e),
                Err(e) => return Err(e),
            }
        }
        outcome.errors.extend((0..skipped).map(|_| AttachmentError::CountLimitReached {
            limit: self.max_attachment_count,
        }));

        if self.context.adopts_shared_titles()
            && let Some(title) = &outcome.title
            && self
                .mailbox_manager
                .set_draft_subject_if_empty(self.draft_uuid, title)
                .await?
        {
            debug!(draft = %self.draft_uuid, "Subject taken from shared title");
        }

        info!(
            draft = %self.draft_uuid,
            imported = outcome.imported.len(),
            failed = outcome.errors.len(),
            "Attachments imported"
        );
        Ok(outcome)
    }

    /// Places, resolves and uploads one source.
    ///
    /// If the draft goes over the size ceiling once the source is resolved,
    /// the attachment is removed again. An upload failure keeps the
    /// attachment and records the error on its task.
    ///
    /// Returns the attachment and the title of the source.
    ///
    /// # Errors
    ///
    /// Returns an [`AttachmentError`] if the source was dropped.
    pub async fn process_new_attachment(
        &self,
        source: AttachmentSource,
    ) -> Result<(Attachment, Option<String>)> {
        let disposition = AttachmentDisposition::Attachment;
        let placeholder = self
            .create_local_attachment(&source.display_name(), disposition)
            .await?;
        let uuid = placeholder.uuid;

        let resolved = match self.resolver.resolve(&source, uuid).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(attachment = %uuid, "Resolution failed: {e}");
                self.remove_attachment(uuid).await?;
                return Err(e.into());
            }
        };
        let title = resolved.title.clone();
        let attachment = self.update_local_attachment(uuid, &resolved).await?;

        self.enforce_size_limit(uuid).await?;

        match self.upload(uuid).await {
            Ok(uploaded) => Ok((uploaded, title)),
            Err(Error::Attachment(AttachmentError::Upload { reason, .. })) => {
                warn!(attachment = %uuid, "Upload failed: {reason}");
                Ok((attachment, title))
            }
            Err(e) => Err(e),
        }
    }

    /// Removes `uuid` if the draft is now over the size ceiling.
    async fn enforce_size_limit(&self, uuid: Uuid) -> Result<()> {
        let limit = self.max_attachments_size;
        let total = self
            .mailbox_manager
            .modify_attachments(self.draft_uuid, |list| {
                let total: u64 = list.iter().map(|a| a.size).sum();
                if total > limit {
                    list.retain(|a| a.uuid != uuid);
                }
                total
            })
            .await?;
        if total <= limit {
            return Ok(());
        }

        warn!(attachment = %uuid, total, limit, "Attachment size limit exceeded");
        self.tasks.remove(&uuid);
        self.resolver.discard(uuid).await;
        Err(AttachmentError::SizeLimitExceeded { total, limit }.into())
    }

    /// Uploads the resolved attachment `uuid`.
    ///
    /// On success the server's record replaces the local one, keeping the
    /// UUID, and the task is dropped. On failure the error is recorded on the
    /// task and the attachment stays.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::Upload`] if the server call fails and
    /// [`AttachmentError::Cancelled`] if the attachment was removed meanwhile.
    pub async fn upload(&self, uuid: Uuid) -> Result<Attachment> {
        let attachment = self
            .attachments()
            .await?
            .into_iter()
            .find(|a| a.uuid == uuid)
            .ok_or(AttachmentError::NotFound(uuid))?;
        if attachment.is_uploaded() {
            return Ok(attachment);
        }
        let path = attachment
            .local_path
            .clone()
            .ok_or(AttachmentError::NotResolved(uuid))?;

        self.tasks.insert(uuid, AttachmentTask::default());
        let tasks = Arc::clone(&self.tasks);
        let progress: ProgressCallback = Arc::new(move |value| {
            if let Some(mut task) = tasks.get_mut(&uuid) {
                task.progress = value;
            }
        });

        let fetcher = Arc::clone(self.mailbox_manager.api_fetcher());
        let mailbox = self.mailbox_manager.mailbox().clone();
        let metadata = attachment;
        let handle = tokio::spawn(async move {
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => return Err(format!("{}: {e}", path.display())),
            };
            fetcher
                .perform(|api, token| {
                    let data = data.clone();
                    let mailbox = mailbox.clone();
                    let metadata = metadata.clone();
                    let progress = Arc::clone(&progress);
                    async move {
                        api.create_attachment(&token, &mailbox, data, &metadata, progress)
                            .await
                    }
                })
                .await
                .map_err(|e| e.to_string())
        });
        self.uploads.insert(uuid, handle.abort_handle());
        // Removed before the handle was registered.
        let still_there = self
            .attachments()
            .await
            .map(|list| list.iter().any(|a| a.uuid == uuid));
        if !matches!(still_there, Ok(true)) {
            handle.abort();
        }
        let joined = handle.await;
        self.uploads.remove(&uuid);

        let remote = match joined {
            Ok(Ok(remote)) => remote,
            Ok(Err(reason)) => {
                if let Some(mut task) = self.tasks.get_mut(&uuid) {
                    task.error = Some(reason.clone());
                }
                return Err(AttachmentError::Upload { uuid, reason }.into());
            }
            Err(e) if e.is_cancelled() => {
                debug!(attachment = %uuid, "Upload cancelled");
                self.tasks.remove(&uuid);
                return Err(AttachmentError::Cancelled(uuid).into());
            }
            Err(e) => return Err(e.into()),
        };

        let replaced = self
            .replace_attachment(uuid, |current| Attachment {
                uuid,
                local_path: current.local_path.clone(),
                ..remote
            })
            .await;
        let uploaded = match replaced {
            Err(Error::Attachment(AttachmentError::NotFound(_))) => {
                debug!(attachment = %uuid, "Attachment removed during upload");
                self.tasks.remove(&uuid);
                return Err(AttachmentError::Cancelled(uuid).into());
            }
            other => other?,
        };
        self.tasks.remove(&uuid);
        info!(attachment = %uuid, part_id = ?uploaded.part_id, "Attachment uploaded");
        Ok(uploaded)
    }

    /// Cancels the upload of `uuid`, removes it from the draft and drops its task.
    ///
    /// Returns the removed attachment, if it was still there.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is missing or the store fails.
    pub async fn remove_attachment(&self, uuid: Uuid) -> Result<Option<Attachment>> {
        if let Some((_, upload)) = self.uploads.remove(&uuid) {
            upload.abort();
        }
        let removed = self
            .mailbox_manager
            .modify_attachments(self.draft_uuid, |list| {
                list.iter()
                    .position(|a| a.uuid == uuid)
                    .map(|index| list.remove(index))
            })
            .await?;
        // An upload may have registered while the draft was being updated.
        if let Some((_, upload)) = self.uploads.remove(&uuid) {
            upload.abort();
        }
        self.tasks.remove(&uuid);
        self.resolver.discard(uuid).await;
        debug!(attachment = %uuid, removed = removed.is_some(), "Attachment removed");
        Ok(removed)
    }

    /// Progress tracker of `uuid`, while it has one.
    #[must_use]
    pub fn attachment_upload_task(&self, uuid: Uuid) -> Option<AttachmentTask> {
        self.tasks.get(&uuid).map(|task| task.clone())
    }

    /// All live progress trackers.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<(Uuid, AttachmentTask)> {
        self.tasks
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Replaces the whole record of `uuid` with `build(current)`.
    async fn replace_attachment(
        &self,
        uuid: Uuid,
        build: impl FnOnce(&Attachment) -> Attachment + Send,
    ) -> Result<Attachment> {
        self.mailbox_manager
            .modify_attachments(self.draft_uuid, |list| {
                let slot = list.iter_mut().find(|a| a.uuid == uuid)?;
                *slot = build(&*slot);
                Some(slot.clone())
            })
            .await?
            .ok_or_else(|| AttachmentError::NotFound(uuid).into())
    }
}
