//! Attachment model types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// MIME type used until the real one is known.
pub(crate) const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// How the attachment is shown in the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentDisposition {
    /// Regular attachment.
    #[default]
    Attachment,
    /// Rendered inside the body (images).
    Inline,
}

/// A file attached to a draft.
///
/// `uuid` is the local identity and never changes. The attachment is
/// uploaded once the server has assigned a `part_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Local identity.
    pub uuid: Uuid,
    /// Remote part id, set by the server on upload.
    #[serde(default)]
    pub part_id: Option<String>,
    /// File name.
    pub name: String,
    /// MIME type.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Size in bytes; zero until the source is resolved.
    #[serde(default)]
    pub size: u64,
    /// Disposition.
    #[serde(default)]
    pub disposition: AttachmentDisposition,
    /// Content id, for inline attachments.
    #[serde(default)]
    pub content_id: Option<String>,
    /// Resolved local copy.
    #[serde(default)]
    pub local_path: Option<PathBuf>,
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

impl Attachment {
    /// Create a placeholder with a fresh UUID and nothing resolved yet.
    #[must_use]
    pub fn local_placeholder(name: impl Into<String>, disposition: AttachmentDisposition) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            part_id: None,
            name: name.into(),
            mime_type: default_mime_type(),
            size: 0,
            disposition,
            content_id: None,
            local_path: None,
        }
    }

    /// Returns true once the server knows about this attachment.
    #[must_use]
    pub const fn is_uploaded(&self) -> bool {
        self.part_id.is_some()
    }

    /// Returns true while only the placeholder exists.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.part_id.is_none() && self.local_path.is_none()
    }
}

/// Upload progress of one attachment.
///
/// Trackers are kept in memory only and dropped once the upload is done or
/// the attachment is removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentTask {
    /// Upload progress in `0.0..=1.0`.
    pub progress: f64,
    /// Last upload error, if any.
    pub error: Option<String>,
}

/// Where an imported attachment comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// A file on disk.
    File(PathBuf),
    /// Raw bytes (pasted content, shared items).
    Data {
        /// Content.
        bytes: Vec<u8>,
        /// Suggested file name.
        file_name: String,
        /// Title of the shared item, if any.
        title: Option<String>,
    },
}

impl AttachmentSource {
    /// Name shown for the placeholder before the source is resolved.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map_or_else(String::new, |name| name.to_string_lossy().into_owned()),
            Self::Data { file_name, .. } => file_name.clone(),
        }
    }

    /// Title carried by the source.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::File(_) => None,
            Self::Data { title, .. } => title.as_deref().filter(|t| !t.is_empty()),
        }
    }
}

/// Result of one import batch.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Attachments that were added and kept.
    pub imported: Vec<Attachment>,
    /// Failures, one per source that was dropped.
    pub errors: Vec<crate::AttachmentError>,
    /// First non-empty title found across the batch.
    pub title: Option<String>,
}

impl ImportOutcome {
    /// Returns true if every source was imported.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_has_nothing_resolved() {
        let attachment = Attachment::local_placeholder("photo.jpg", AttachmentDisposition::Inline);
        assert_eq!(attachment.size, 0);
        assert_eq!(attachment.mime_type, DEFAULT_MIME_TYPE);
        assert!(attachment.is_placeholder());
        assert!(!attachment.is_uploaded());
    }

    #[test]
    fn test_source_names_and_titles() {
        let file = AttachmentSource::File(PathBuf::from("/tmp/report.pdf"));
        assert_eq!(file.display_name(), "report.pdf");
        assert_eq!(file.title(), None);

        let data = AttachmentSource::Data {
            bytes: vec![1, 2, 3],
            file_name: "link.webloc".into(),
            title: Some(String::new()),
        };
        assert_eq!(data.display_name(), "link.webloc");
        assert_eq!(data.title(), None);
    }

    #[test]
    fn test_attachment_json_defaults() {
        let json = r#"{"uuid":"67e55044-10b1-426f-9247-bb680e5fe0c8","name":"a.txt"}"#;
        let attachment: Attachment = serde_json::from_str(json).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(attachment.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(attachment.disposition, AttachmentDisposition::Attachment);
    }
}
