//! Core configuration.
//!
//! Loaded from `config.json` in the platform configuration directory. Every
//! field has a default so a missing or partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::StoreLocation;
use crate::{Error, Result};

/// Directory name used under the platform config and data directories.
const APP_DIR: &str = "mailroom";

/// Where the core is running.
///
/// Extensions get a fraction of the memory and time budget of the app, so a
/// few expensive operations behave differently there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContext {
    /// The main application.
    #[default]
    App,
    /// A background extension (notification service and the like).
    Extension,
    /// The share extension, which creates drafts from shared content.
    ShareExtension,
}

impl ExecutionContext {
    /// Returns true if a full contact merge may run in this context.
    #[must_use]
    pub const fn allows_contact_merge(self) -> bool {
        matches!(self, Self::App)
    }

    /// Returns true if imported attachment titles may become the draft subject.
    #[must_use]
    pub const fn adopts_shared_titles(self) -> bool {
        matches!(self, Self::ShareExtension)
    }
}

/// Core settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding the local stores (platform data dir when unset).
    pub data_dir: Option<PathBuf>,
    /// Keep every store in memory; nothing touches the disk.
    pub in_memory: bool,
    /// Execution context.
    pub context: ExecutionContext,
    /// Minimum time between two contact refreshes.
    pub contacts_refresh_interval_secs: u64,
    /// Default result cap of contact searches.
    pub search_limit: usize,
    /// Ceiling of the summed attachment sizes of one draft, in bytes.
    pub max_attachments_size: u64,
    /// Maximum number of attachments the remote API accepts on one draft.
    pub max_attachment_count: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            in_memory: false,
            context: ExecutionContext::App,
            contacts_refresh_interval_secs: 60,
            search_limit: 120,
            max_attachments_size: 25 * 1024 * 1024,
            max_attachment_count: 100,
        }
    }
}

impl CoreConfig {
    /// Configuration that keeps every store in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self.in_memory = false;
        self
    }

    /// Sets the execution context.
    #[must_use]
    pub const fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }

    /// Minimum time between two contact refreshes.
    #[must_use]
    pub const fn contacts_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.contacts_refresh_interval_secs)
    }

    /// Resolves where the local stores live.
    #[must_use]
    pub fn store_location(&self) -> StoreLocation {
        if self.in_memory {
            return StoreLocation::InMemory;
        }
        let dir = self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        });
        StoreLocation::Directory(dir)
    }

    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Loads the configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_default() -> Result<Self> {
        Self::load(&Self::default_path()).await
    }

    /// Loads the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Checks values that would make the core misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.search_limit == 0 {
            return Err(Error::Config("search_limit must be positive".into()));
        }
        if self.max_attachment_count == 0 {
            return Err(Error::Config("max_attachment_count must be positive".into()));
        }
        Ok(())
    }
}
