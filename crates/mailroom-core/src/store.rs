//! Local store files.
//!
//! App-level stores (`accounts.sqlite`, `mailbox_infos.sqlite`) sit at the
//! root of the data directory. Per-user contact stores live in `contacts/`
//! and are named after the user id; per-mailbox stores live in `mailboxes/`
//! and are named `{user_id}-{mailbox_id}`.

use std::path::PathBuf;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::Result;
use crate::account::UserId;
use crate::mailbox::MailboxId;

/// Subdirectory of per-user contact stores.
pub(crate) const CONTACTS_NAMESPACE: &str = "contacts";

/// Subdirectory of per-mailbox stores.
pub(crate) const MAILBOXES_NAMESPACE: &str = "mailboxes";

const EXTENSION: &str = "sqlite";

/// Where the local stores are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Nothing is written to disk.
    InMemory,
    /// One `SQLite` file per store under this directory.
    Directory(PathBuf),
}

impl StoreLocation {
    /// Opens (creating if needed) the store `file_name` in `namespace`.
    pub(crate) async fn open(&self, namespace: Option<&str>, file_name: &str) -> Result<SqlitePool> {
        match self {
            Self::InMemory => {
                // A single connection that never expires; the database
                // disappears with it.
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect("sqlite::memory:")
                    .await?;
                Ok(pool)
            }
            Self::Directory(root) => {
                let dir = namespace.map_or_else(|| root.clone(), |ns| root.join(ns));
                tokio::fs::create_dir_all(&dir).await?;
                let path = dir.join(file_name);
                let url = format!("sqlite:{}?mode=rwc", path.display());
                let pool = SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect(&url)
                    .await?;
                debug!("Opened store {}", path.display());
                Ok(pool)
            }
        }
    }

    /// Deletes every store file of `user_id` in both namespaces.
    ///
    /// Returns the number of files removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read or a file cannot be removed.
    pub async fn delete_user_files(&self, user_id: UserId) -> Result<usize> {
        let contacts_file = user_file_name(user_id);
        let mailbox_prefix = format!("{user_id}-");
        let removed = self
            .delete_matching(CONTACTS_NAMESPACE, |name| name.starts_with(&contacts_file))
            .await?
            + self
                .delete_matching(MAILBOXES_NAMESPACE, |name| name.starts_with(&mailbox_prefix))
                .await?;
        Ok(removed)
    }

    /// Deletes the store files of one mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a file cannot be removed.
    pub async fn delete_mailbox_files(&self, user_id: UserId, mailbox_id: MailboxId) -> Result<usize> {
        let file = mailbox_file_name(user_id, mailbox_id);
        self.delete_matching(MAILBOXES_NAMESPACE, |name| name.starts_with(&file))
            .await
    }

    /// Removes files of `namespace` whose name satisfies `matches`.
    ///
    /// `SQLite` side files (`-wal`, `-shm`, `-journal`) share the store name as
    /// prefix, so prefix predicates catch them too.
    async fn delete_matching(&self, namespace: &str, matches: impl Fn(&str) -> bool) -> Result<usize> {
        let Self::Directory(root) = self else {
            return Ok(0);
        };
        let dir = root.join(namespace);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !matches(name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {e}", entry.path().display());
                    return Err(e.into());
                }
            }
        }
        debug!("Removed {removed} file(s) from {namespace}");
        Ok(removed)
    }
}

/// File name of a user's contact store.
pub(crate) fn user_file_name(user_id: UserId) -> String {
    format!("{user_id}.{EXTENSION}")
}

/// File name of a mailbox store.
pub(crate) fn mailbox_file_name(user_id: UserId, mailbox_id: MailboxId) -> String {
    format!("{user_id}-{mailbox_id}.{EXTENSION}")
}

/// A store opened on first use.
///
/// Factories hand out managers synchronously and never fail; the file is only
/// opened (and its schema created) when the first query needs it.
pub(crate) struct LazyStore {
    location: StoreLocation,
    namespace: &'static str,
    file_name: String,
    schema: &'static [&'static str],
    pool: OnceCell<SqlitePool>,
}

impl LazyStore {
    pub(crate) fn new(
        location: StoreLocation,
        namespace: &'static str,
        file_name: String,
        schema: &'static [&'static str],
    ) -> Self {
        Self {
            location,
            namespace,
            file_name,
            schema,
            pool: OnceCell::new(),
        }
    }

    /// Returns the pool, opening the store and creating its schema if needed.
    pub(crate) async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = self
                    .location
                    .open(Some(self.namespace), &self.file_name)
                    .await?;
                for statement in self.schema {
                    sqlx::query(statement).execute(&pool).await?;
                }
                Ok::<_, crate::Error>(pool)
            })
            .await
    }

    /// Closes the pool if it was ever opened.
    pub(crate) async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}

impl std::fmt::Debug for LazyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyStore")
            .field("namespace", &self.namespace)
            .field("file_name", &self.file_name)
            .field("open", &self.pool.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SCHEMA: &[&str] = &["CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY)"];

    #[test]
    fn test_file_names() {
        assert_eq!(user_file_name(UserId::new(12)), "12.sqlite");
        assert_eq!(mailbox_file_name(UserId::new(12), MailboxId::new(3)), "12-3.sqlite");
    }

    #[tokio::test]
    async fn test_lazy_store_opens_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let location = StoreLocation::Directory(dir.path().to_path_buf());
        let store = LazyStore::new(location, CONTACTS_NAMESPACE, user_file_name(UserId::new(1)), SCHEMA);

        assert!(!dir.path().join("contacts").join("1.sqlite").exists());
        let pool = store.pool().await.unwrap();
        sqlx::query("INSERT INTO t (id) VALUES (1)").execute(pool).await.unwrap();
        assert!(dir.path().join("contacts").join("1.sqlite").exists());
        store.close().await;
    }

    #[tokio::test]
    async fn test_delete_user_files_spares_other_users() {
        let dir = tempfile::tempdir().unwrap();
        let location = StoreLocation::Directory(dir.path().to_path_buf());
        for (ns, name) in [
            (CONTACTS_NAMESPACE, "1.sqlite"),
            (CONTACTS_NAMESPACE, "1.sqlite-wal"),
            (CONTACTS_NAMESPACE, "12.sqlite"),
            (MAILBOXES_NAMESPACE, "1-5.sqlite"),
            (MAILBOXES_NAMESPACE, "1-6.sqlite"),
            (MAILBOXES_NAMESPACE, "12-5.sqlite"),
        ] {
            let ns_dir = dir.path().join(ns);
            std::fs::create_dir_all(&ns_dir).unwrap();
            std::fs::write(ns_dir.join(name), b"").unwrap();
        }

        let removed = location.delete_user_files(UserId::new(1)).await.unwrap();
        assert_eq!(removed, 4);
        assert!(dir.path().join("contacts/12.sqlite").exists());
        assert!(dir.path().join("mailboxes/12-5.sqlite").exists());
        assert!(!dir.path().join("mailboxes/1-6.sqlite").exists());
    }

    #[tokio::test]
    async fn test_delete_mailbox_files_only_targets_one_mailbox() {
        let dir = tempfile::tempdir().unwrap();
        let location = StoreLocation::Directory(dir.path().to_path_buf());
        let ns_dir = dir.path().join(MAILBOXES_NAMESPACE);
        std::fs::create_dir_all(&ns_dir).unwrap();
        std::fs::write(ns_dir.join("1-5.sqlite"), b"").unwrap();
        std::fs::write(ns_dir.join("1-50.sqlite"), b"").unwrap();

        let removed = location
            .delete_mailbox_files(UserId::new(1), MailboxId::new(5))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(ns_dir.join("1-50.sqlite").exists());
    }

    #[tokio::test]
    async fn test_in_memory_location_deletes_nothing() {
        assert_eq!(
            StoreLocation::InMemory
                .delete_user_files(UserId::new(1))
                .await
                .unwrap(),
            0
        );
    }
}
