//! Turning attachment sources into local files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::AttachmentError;
use super::model::AttachmentSource;

/// A source copied to a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Local copy.
    pub path: PathBuf,
    /// File name.
    pub name: String,
    /// Guessed MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Title carried by the source.
    pub title: Option<String>,
}

/// Resolves attachment sources to local files.
#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// Makes a local copy of `source` for the attachment `uuid`.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError::Resolution`] if the source cannot be read or copied.
    async fn resolve(
        &self,
        source: &AttachmentSource,
        uuid: Uuid,
    ) -> Result<ResolvedAttachment, AttachmentError>;

    /// Drops whatever was resolved for `uuid`.
    async fn discard(&self, _uuid: Uuid) {}
}

/// Copies sources into one directory per attachment under `root`.
#[derive(Debug, Clone)]
pub struct FileAttachmentResolver {
    root: PathBuf,
}

impl FileAttachmentResolver {
    /// Create a resolver writing under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a resolver writing under the system temp directory.
    #[must_use]
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("mailroom-attachments"))
    }

    fn directory_for(&self, uuid: Uuid) -> PathBuf {
        self.root.join(uuid.to_string())
    }
}

#[async_trait]
impl AttachmentResolver for FileAttachmentResolver {
    async fn resolve(
        &self,
        source: &AttachmentSource,
        uuid: Uuid,
    ) -> Result<ResolvedAttachment, AttachmentError> {
        let dir = self.directory_for(uuid);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AttachmentError::Resolution(e.to_string()))?;

        let name = sanitize_file_name(&source.display_name());
        let target = dir.join(&name);

        match source {
            AttachmentSource::File(path) => {
                tokio::fs::copy(path, &target).await.map_err(|e| {
                    AttachmentError::Resolution(format!("{}: {e}", path.display()))
                })?;
            }
            AttachmentSource::Data { bytes, .. } => {
                tokio::fs::write(&target, bytes)
                    .await
                    .map_err(|e| AttachmentError::Resolution(e.to_string()))?;
            }
        }

        let size = tokio::fs::metadata(&target)
            .await
            .map_err(|e| AttachmentError::Resolution(e.to_string()))?
            .len();
        let mime_type = guess_mime_type(&target);
        debug!("Resolved attachment {uuid} to {} ({size} bytes)", target.display());

        Ok(ResolvedAttachment {
            path: target,
            name,
            mime_type,
            size,
            title: source.title().map(ToString::to_string),
        })
    }

    async fn discard(&self, uuid: Uuid) {
        let dir = self.directory_for(uuid);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {e}", dir.display()),
        }
    }
}

fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Keeps the last path component; empty names become `attachment`.
fn sanitize_file_name(name: &str) -> String {
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        "attachment".to_string()
    } else {
        name.to_string()
    }
}
