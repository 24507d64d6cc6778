//! Attachment errors.

use uuid::Uuid;

/// Errors surfaced per attachment.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    /// Adding the attachment pushed the draft over the size ceiling.
    #[error("Attachments exceed the {limit} byte limit ({total} bytes)")]
    SizeLimitExceeded {
        /// Total size including the offending attachment.
        total: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The draft already carries the maximum number of attachments.
    #[error("No attachment slot left (limit {limit})")]
    CountLimitReached {
        /// Configured count limit.
        limit: usize,
    },

    /// The source could not be turned into a local file.
    #[error("Could not resolve attachment: {0}")]
    Resolution(String),

    /// Upload to the server failed.
    #[error("Upload of {uuid} failed: {reason}")]
    Upload {
        /// Attachment UUID.
        uuid: Uuid,
        /// Failure reason.
        reason: String,
    },

    /// The upload was cancelled because the attachment was removed.
    #[error("Upload of {0} was cancelled")]
    Cancelled(Uuid),

    /// The attachment has no local file to upload.
    #[error("Attachment {0} has no local file")]
    NotResolved(Uuid),

    /// The attachment is not part of the draft.
    #[error("Attachment {0} not found")]
    NotFound(Uuid),

    /// The draft does not exist.
    #[error("Draft {0} not found")]
    DraftNotFound(Uuid),
}
