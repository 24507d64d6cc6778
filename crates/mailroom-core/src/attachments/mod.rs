//! Draft attachments: placeholders, import, upload.

mod error;
mod model;
mod resolver;
mod worker;

pub use error::AttachmentError;
pub use model::{Attachment, AttachmentDisposition, AttachmentSource, AttachmentTask, ImportOutcome};
pub use resolver::{AttachmentResolver, FileAttachmentResolver, ResolvedAttachment};
pub use worker::AttachmentsManagerWorker;
