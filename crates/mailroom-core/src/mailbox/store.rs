//! Per-mailbox local store: folders and drafts.
//!
//! Attachments have no identity of their own in this store; they are embedded
//! in their draft as a JSON array and always rewritten as a whole.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::model::{Draft, Folder, FolderRole, MailboxId};
use crate::Result;
use crate::account::UserId;
use crate::attachments::Attachment;
use crate::store::{LazyStore, MAILBOXES_NAMESPACE, StoreLocation, mailbox_file_name};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS folders (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        path TEXT NOT NULL DEFAULT '',
        role TEXT,
        unread_count INTEGER NOT NULL DEFAULT 0,
        cursor TEXT
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS drafts (
        local_uuid TEXT PRIMARY KEY NOT NULL,
        subject TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        attachments_json TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    ",
];

/// Local store of one mailbox.
#[derive(Debug)]
pub(crate) struct MailboxStore {
    store: LazyStore,
}

impl MailboxStore {
    pub(crate) fn new(location: StoreLocation, user_id: UserId, mailbox_id: MailboxId) -> Self {
        Self {
            store: LazyStore::new(
                location,
                MAILBOXES_NAMESPACE,
                mailbox_file_name(user_id, mailbox_id),
                SCHEMA,
            ),
        }
    }

    pub(crate) async fn close(&self) {
        self.store.close().await;
    }

    /// Replace the folder list, keeping the sync cursor of folders that survive.
    pub(crate) async fn replace_folders(&self, folders: &[Folder]) -> Result<()> {
        let pool = self.store.pool().await?;
        let mut tx = pool.begin().await?;

        let cursors: Vec<(String, Option<String>)> = sqlx::query("SELECT id, cursor FROM folders")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| (row.get("id"), row.get("cursor")))
            .collect();

        sqlx::query("DELETE FROM folders").execute(&mut *tx).await?;

        for folder in folders {
            let cursor = folder.cursor.clone().or_else(|| {
                cursors
                    .iter()
                    .find(|(id, _)| *id == folder.id)
                    .and_then(|(_, cursor)| cursor.clone())
            });
            sqlx::query(
                r"
                INSERT INTO folders (id, name, path, role, unread_count, cursor)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&folder.id)
            .bind(&folder.name)
            .bind(&folder.path)
            .bind(folder.effective_role().map(FolderRole::as_str))
            .bind(i64::from(folder.unread_count))
            .bind(cursor)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn folders(&self) -> Result<Vec<Folder>> {
        let pool = self.store.pool().await?;
        let rows = sqlx::query("SELECT * FROM folders ORDER BY path, name")
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(row_to_folder).collect())
    }

    pub(crate) async fn folder(&self, role: FolderRole) -> Result<Option<Folder>> {
        let pool = self.store.pool().await?;
        let row = sqlx::query("SELECT * FROM folders WHERE role = ? LIMIT 1")
            .bind(role.as_str())
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(row_to_folder))
    }

    pub(crate) async fn set_folder_cursor(&self, folder_id: &str, cursor: &str) -> Result<bool> {
        let pool = self.store.pool().await?;
        let result = sqlx::query("UPDATE folders SET cursor = ? WHERE id = ?")
            .bind(cursor)
            .bind(folder_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn save_draft(&self, draft: &Draft) -> Result<()> {
        let pool = self.store.pool().await?;
        sqlx::query(
            r"
            INSERT OR REPLACE INTO drafts (local_uuid, subject, body, attachments_json, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ",
        )
        .bind(draft.local_uuid.to_string())
        .bind(&draft.subject)
        .bind(&draft.body)
        .bind(serde_json::to_string(&draft.attachments)?)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub(crate) async fn draft(&self, local_uuid: Uuid) -> Result<Option<Draft>> {
        let pool = self.store.pool().await?;
        let row = sqlx::query("SELECT * FROM drafts WHERE local_uuid = ?")
            .bind(local_uuid.to_string())
            .fetch_optional(pool)
            .await?;
        row.as_ref().map(row_to_draft).transpose()
    }

    /// Sets the subject only if the draft has none yet.
    pub(crate) async fn set_subject_if_empty(&self, local_uuid: Uuid, subject: &str) -> Result<bool> {
        let pool = self.store.pool().await?;
        let result = sqlx::query(
            "UPDATE drafts SET subject = ?, updated_at = CURRENT_TIMESTAMP WHERE local_uuid = ? AND subject = ''",
        )
        .bind(subject)
        .bind(local_uuid.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn set_subject(&self, local_uuid: Uuid, subject: &str) -> Result<bool> {
        let pool = self.store.pool().await?;
        let result = sqlx::query(
            "UPDATE drafts SET subject = ?, updated_at = CURRENT_TIMESTAMP WHERE local_uuid = ?",
        )
        .bind(subject)
        .bind(local_uuid.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Runs `edit` on the attachment list of a draft inside one write
    /// transaction and stores the list back.
    ///
    /// Returns `None` if the draft does not exist.
    pub(crate) async fn modify_attachments<R>(
        &self,
        local_uuid: Uuid,
        edit: impl FnOnce(&mut Vec<Attachment>) -> R + Send,
    ) -> Result<Option<R>> {
        let pool = self.store.pool().await?;
        let mut tx = pool.begin().await?;

        let row = sqlx::query("SELECT attachments_json FROM drafts WHERE local_uuid = ?")
            .bind(local_uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut attachments: Vec<Attachment> =
            serde_json::from_str(&row.get::<String, _>("attachments_json"))?;
        let output = edit(&mut attachments);

        sqlx::query(
            "UPDATE drafts SET attachments_json = ?, updated_at = CURRENT_TIMESTAMP WHERE local_uuid = ?",
        )
        .bind(serde_json::to_string(&attachments)?)
        .bind(local_uuid.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(output))
    }
}

fn row_to_folder(row: &SqliteRow) -> Folder {
    Folder {
        id: row.get("id"),
        name: row.get("name"),
        path: row.get("path"),
        role: row
            .get::<Option<String>, _>("role")
            .as_deref()
            .and_then(FolderRole::parse),
        unread_count: u32::try_from(row.get::<i64, _>("unread_count")).unwrap_or_default(),
        cursor: row.get("cursor"),
    }
}

fn row_to_draft(row: &SqliteRow) -> Result<Draft> {
    let raw_uuid: String = row.get("local_uuid");
    Ok(Draft {
        local_uuid: Uuid::parse_str(&raw_uuid).unwrap_or_default(),
        subject: row.get("subject"),
        body: row.get("body"),
        attachments: serde_json::from_str(&row.get::<String, _>("attachments_json"))?,
    })
}
