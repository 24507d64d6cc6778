//! Per-user contact store.

use std::collections::HashSet;

use futures::TryStreamExt;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::model::{AddressBook, ContactOrigin, GroupContact, MergedContact};
use super::search::{Collector, Comparator, Matcher};
use crate::Result;
use crate::account::UserId;
use crate::store::{CONTACTS_NAMESPACE, LazyStore, StoreLocation, user_file_name};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS merged_contacts (
        id TEXT PRIMARY KEY NOT NULL,
        email TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        origin_json TEXT NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_merged_contacts_email ON merged_contacts(email COLLATE NOCASE)
    ",
    r"
    CREATE TABLE IF NOT EXISTS address_books (
        id INTEGER PRIMARY KEY NOT NULL,
        uuid TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS group_contacts (
        id INTEGER PRIMARY KEY NOT NULL,
        address_book_id INTEGER NOT NULL,
        name TEXT NOT NULL
    )
    ",
];

/// How a merge commit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommitOutcome {
    /// Everything was written.
    Committed {
        /// Rows written.
        upserted: usize,
        /// Orphan rows removed.
        deleted: usize,
    },
    /// Cancelled before anything was committed.
    Cancelled,
}

/// Contact store of one user.
#[derive(Debug)]
pub(crate) struct ContactRepository {
    store: LazyStore,
}

impl ContactRepository {
    pub(crate) fn new(location: StoreLocation, user_id: UserId) -> Self {
        Self {
            store: LazyStore::new(location, CONTACTS_NAMESPACE, user_file_name(user_id), SCHEMA),
        }
    }

    pub(crate) async fn close(&self) {
        self.store.close().await;
    }

    /// Makes the stored merged contacts exactly `contacts`.
    ///
    /// Rows not in `contacts` are deleted and the others upserted, all in one
    /// transaction. `cancel` is checked before each write phase and before
    /// commit; a cancelled call leaves the store untouched.
    pub(crate) async fn replace_merged_contacts(
        &self,
        contacts: &[MergedContact],
        cancel: &CancellationToken,
    ) -> Result<CommitOutcome> {
        let pool = self.store.pool().await?;
        let mut tx = pool.begin().await?;

        let existing: Vec<String> = sqlx::query("SELECT id FROM merged_contacts")
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.get("id"))
            .collect();
        let keep: HashSet<&str> = contacts.iter().map(|c| c.id.as_str()).collect();
        let orphans: Vec<String> = existing
            .into_iter()
            .filter(|id| !keep.contains(id.as_str()))
            .collect();

        if cancel.is_cancelled() {
            return Ok(CommitOutcome::Cancelled);
        }
        for id in &orphans {
            sqlx::query("DELETE FROM merged_contacts WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if cancel.is_cancelled() {
            return Ok(CommitOutcome::Cancelled);
        }
        for contact in contacts {
            sqlx::query(
                r"
                INSERT OR REPLACE INTO merged_contacts (id, email, name, origin_json)
                VALUES (?, ?, ?, ?)
                ",
            )
            .bind(&contact.id)
            .bind(&contact.email)
            .bind(&contact.name)
            .bind(serde_json::to_string(&contact.origin)?)
            .execute(&mut *tx)
            .await?;
        }

        if cancel.is_cancelled() {
            return Ok(CommitOutcome::Cancelled);
        }
        tx.commit().await?;

        debug!("Stored {} merged contact(s), removed {}", contacts.len(), orphans.len());
        Ok(CommitOutcome::Committed {
            upserted: contacts.len(),
            deleted: orphans.len(),
        })
    }

    pub(crate) async fn merged_contacts(&self) -> Result<Vec<MergedContact>> {
        let pool = self.store.pool().await?;
        let rows = sqlx::query("SELECT * FROM merged_contacts ORDER BY name, email")
            .fetch_all(pool)
            .await?;
        rows.iter().map(row_to_contact).collect()
    }

    pub(crate) async fn contacts_with_email(&self, email: &str) -> Result<Vec<MergedContact>> {
        let pool = self.store.pool().await?;
        let rows = sqlx::query(
            "SELECT * FROM merged_contacts WHERE email = ? COLLATE NOCASE ORDER BY name",
        )
        .bind(email.trim())
        .fetch_all(pool)
        .await?;
        rows.iter().map(row_to_contact).collect()
    }

    /// Streams merged contacts, keeping those matching `query`.
    pub(crate) async fn search_merged_contacts(
        &self,
        query: &str,
        limit: usize,
        comparator: Option<Comparator<'_, MergedContact>>,
    ) -> Result<Vec<MergedContact>> {
        let pool = self.store.pool().await?;
        let matcher = Matcher::new(query);
        let mut collector = Collector::new(limit, comparator);

        let mut rows = sqlx::query("SELECT * FROM merged_contacts ORDER BY name, email").fetch(pool);
        while let Some(row) = rows.try_next().await? {
            if collector.is_full() {
                break;
            }
            let email: String = row.get("email");
            let name: String = row.get("name");
            if matcher.matches([name.as_str(), email.as_str()]) && !collector.push(row_to_contact(&row)?)
            {
                break;
            }
        }
        Ok(collector.finish())
    }

    /// Replaces address books and their groups.
    pub(crate) async fn replace_address_books(&self, books: &[AddressBook]) -> Result<()> {
        let pool = self.store.pool().await?;
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM group_contacts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM address_books").execute(&mut *tx).await?;

        for book in books {
            sqlx::query("INSERT INTO address_books (id, uuid, name, is_default) VALUES (?, ?, ?, ?)")
                .bind(book.id)
                .bind(&book.uuid)
                .bind(&book.name)
                .bind(book.is_default)
                .execute(&mut *tx)
                .await?;
            for group in &book.groups {
                sqlx::query(
                    "INSERT OR REPLACE INTO group_contacts (id, address_book_id, name) VALUES (?, ?, ?)",
                )
                .bind(group.id)
                .bind(book.id)
                .bind(&group.name)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn address_books(&self) -> Result<Vec<AddressBook>> {
        let pool = self.store.pool().await?;
        let books = sqlx::query("SELECT * FROM address_books ORDER BY is_default DESC, name")
            .fetch_all(pool)
            .await?;
        let groups = self.group_contacts().await?;

        Ok(books
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                AddressBook {
                    id,
                    uuid: row.get("uuid"),
                    name: row.get("name"),
                    is_default: row.get("is_default"),
                    groups: groups
                        .iter()
                        .filter(|g| g.address_book_id == id)
                        .cloned()
                        .collect(),
                }
            })
            .collect())
    }

    pub(crate) async fn group_contacts(&self) -> Result<Vec<GroupContact>> {
        let pool = self.store.pool().await?;
        let rows = sqlx::query("SELECT * FROM group_contacts ORDER BY name")
            .fetch_all(pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| GroupContact {
                id: row.get("id"),
                name: row.get("name"),
                address_book_id: row.get("address_book_id"),
            })
            .collect())
    }
}

fn row_to_contact(row: &SqliteRow) -> Result<MergedContact> {
    let origin: ContactOrigin = serde_json::from_str(&row.get::<String, _>("origin_json"))?;
    Ok(MergedContact {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        origin,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contacts::RemoteContact;

    fn repo() -> ContactRepository {
        ContactRepository::new(StoreLocation::InMemory, UserId::new(1))
    }

    fn remote(email: &str, name: &str) -> MergedContact {
        MergedContact::from_remote(
            email,
            RemoteContact {
                id: format!("r-{email}"),
                name: name.into(),
                emails: vec![email.into()],
                ..RemoteContact::default()
            },
        )
    }

    #[tokio::test]
    async fn test_replace_removes_orphans() {
        let repo = repo();
        let token = CancellationToken::new();
        repo.replace_merged_contacts(&[remote("a@x.com", "A"), remote("b@x.com", "B")], &token)
            .await
            .unwrap();

        let outcome = repo
            .replace_merged_contacts(&[remote("b@x.com", "B")], &token)
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { upserted: 1, deleted: 1 });

        let stored = repo.merged_contacts().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].email, "b@x.com");
    }

    #[tokio::test]
    async fn test_cancelled_replace_writes_nothing() {
        let repo = repo();
        repo.replace_merged_contacts(&[remote("a@x.com", "A")], &CancellationToken::new())
            .await
            .unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let outcome = repo.replace_merged_contacts(&[], &cancelled).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Cancelled);
        assert_eq!(repo.merged_contacts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_ignores_case_and_accents() {
        let repo = repo();
        repo.replace_merged_contacts(
            &[remote("helene@x.com", "Hélène Dupont"), remote("bob@x.com", "Bob")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let found = repo.search_merged_contacts("HELENE", 10, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "helene@x.com");

        let by_email = repo.contacts_with_email("BOB@x.com").await.unwrap();
        assert_eq!(by_email.len(), 1);
    }

    #[tokio::test]
    async fn test_address_books_keep_groups() {
        let repo = repo();
        let book = AddressBook {
            id: 4,
            uuid: "u".into(),
            name: "Personal".into(),
            is_default: true,
            groups: vec![GroupContact {
                id: 9,
                name: "Family".into(),
                address_book_id: 4,
            }],
        };
        repo.replace_address_books(std::slice::from_ref(&book))
            .await
            .unwrap();

        assert_eq!(repo.address_books().await.unwrap(), vec![book]);
        assert_eq!(repo.group_contacts().await.unwrap().len(), 1);
    }
}
