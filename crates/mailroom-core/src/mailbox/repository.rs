//! Mailbox metadata repository.
//!
//! Holds the mailbox list of every logged-in user, shared by all of them.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::{Mailbox, MailboxId};
use crate::Result;
use crate::account::UserId;
use crate::store::StoreLocation;

/// Repository for mailbox metadata.
pub struct MailboxInfoRepository {
    pool: SqlitePool,
}

impl MailboxInfoRepository {
    /// Opens the repository at `location`.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(location: &StoreLocation) -> Result<Self> {
        let pool = location.open(None, "mailbox_infos.sqlite").await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        Self::new(&StoreLocation::InMemory).await
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mailboxes (
                mailbox_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                uuid TEXT NOT NULL,
                email TEXT NOT NULL,
                local_part TEXT NOT NULL,
                hosting_id INTEGER NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                is_password_valid INTEGER NOT NULL DEFAULT 1,
                is_locked INTEGER NOT NULL DEFAULT 0,
                is_limited INTEGER NOT NULL DEFAULT 0,
                permissions_json TEXT,
                external_mail_flag_json TEXT,
                quotas_json TEXT,
                PRIMARY KEY (mailbox_id, user_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the mailbox list of `user_id`.
    ///
    /// Mailboxes stored locally but missing from `mailboxes` are deleted and
    /// returned, so the caller can drop their local data.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn store_mailboxes(&self, user_id: UserId, mailboxes: &[Mailbox]) -> Result<Vec<Mailbox>> {
        let existing = self.mailboxes_for_user(user_id).await?;
        let removed: Vec<Mailbox> = existing
            .into_iter()
            .filter(|old| !mailboxes.iter().any(|new| new.mailbox_id == old.mailbox_id))
            .collect();

        let mut tx = self.pool.begin().await?;

        for mailbox in &removed {
            sqlx::query("DELETE FROM mailboxes WHERE mailbox_id = ? AND user_id = ?")
                .bind(mailbox.mailbox_id.0)
                .bind(user_id.0)
                .execute(&mut *tx)
                .await?;
        }

        for mailbox in mailboxes {
            sqlx::query(
                r"
                INSERT OR REPLACE INTO mailboxes
                    (mailbox_id, user_id, uuid, email, local_part, hosting_id, is_primary,
                     is_password_valid, is_locked, is_limited,
                     permissions_json, external_mail_flag_json, quotas_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(mailbox.mailbox_id.0)
            .bind(user_id.0)
            .bind(&mailbox.uuid)
            .bind(&mailbox.email)
            .bind(&mailbox.local_part)
            .bind(mailbox.hosting_id)
            .bind(mailbox.is_primary)
            .bind(mailbox.is_password_valid)
            .bind(mailbox.is_locked)
            .bind(mailbox.is_limited)
            .bind(to_json(mailbox.permissions.as_ref())?)
            .bind(to_json(mailbox.external_mail_flag.as_ref())?)
            .bind(to_json(mailbox.quotas.as_ref())?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "Stored {} mailbox(es) for user {user_id}, removed {}",
            mailboxes.len(),
            removed.len()
        );
        Ok(removed)
    }

    /// Mailboxes of `user_id`, primary first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mailboxes_for_user(&self, user_id: UserId) -> Result<Vec<Mailbox>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM mailboxes
            WHERE user_id = ?
            ORDER BY is_primary DESC, mailbox_id ASC
            ",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_mailbox).collect()
    }

    /// Every stored mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn all_mailboxes(&self) -> Result<Vec<Mailbox>> {
        let rows = sqlx::query("SELECT * FROM mailboxes ORDER BY user_id, is_primary DESC, mailbox_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_mailbox).collect()
    }

    /// One mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mailbox(&self, mailbox_id: MailboxId, user_id: UserId) -> Result<Option<Mailbox>> {
        let row = sqlx::query("SELECT * FROM mailboxes WHERE mailbox_id = ? AND user_id = ?")
            .bind(mailbox_id.0)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_mailbox).transpose()
    }

    /// Delete every mailbox of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove_for_user(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM mailboxes WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

fn from_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<Option<T>> {
    let raw: Option<String> = row.get(column);
    Ok(raw.as_deref().map(serde_json::from_str).transpose()?)
}

/// Convert a database row to a Mailbox.
fn row_to_mailbox(row: &SqliteRow) -> Result<Mailbox> {
    Ok(Mailbox {
        mailbox_id: MailboxId::new(row.get("mailbox_id")),
        user_id: UserId::new(row.get("user_id")),
        uuid: row.get("uuid"),
        email: row.get("email"),
        local_part: row.get("local_part"),
        hosting_id: row.get("hosting_id"),
        is_primary: row.get("is_primary"),
        is_password_valid: row.get("is_password_valid"),
        is_locked: row.get("is_locked"),
        is_limited: row.get("is_limited"),
        permissions: from_json(row, "permissions_json")?,
        external_mail_flag: from_json(row, "external_mail_flag_json")?,
        quotas: from_json(row, "quotas_json")?,
    })
}
