//! Account storage repository.

use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::model::{Account, Selection, UserId, UserProfile};
use crate::Result;
use crate::mailbox::MailboxId;
use crate::store::StoreLocation;

const CURRENT_USER_KEY: &str = "current_user_id";
const CURRENT_MAILBOX_KEY: &str = "current_mailbox_id";

/// Repository for the list of logged-in accounts and the current selection.
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Opens the repository at `location`.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(location: &StoreLocation) -> Result<Self> {
        let pool = location.open(None, "accounts.sqlite").await?;

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
            CREATE TABLE IF NOT EXISTS accounts (
                user_id INTEGER PRIMARY KEY NOT NULL,
                display_name TEXT,
                email TEXT,
                avatar TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY NOT NULL,
                value INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all accounts in login order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r"
            SELECT user_id, display_name, email, avatar
            FROM accounts
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Save an account (insert or update), keeping its position in the list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save(&self, account: &Account) -> Result<()> {
        let (display_name, email, avatar) = account.user.as_ref().map_or((None, None, None), |u| {
            (
                Some(u.display_name.as_str()),
                Some(u.email.as_str()),
                u.avatar.as_deref(),
            )
        });

        sqlx::query(
            r"
            INSERT INTO accounts (user_id, display_name, email, avatar)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                avatar = excluded.avatar
            ",
        )
        .bind(account.user_id.0)
        .bind(display_name)
        .bind(email)
        .bind(avatar)
        .execute(&self.pool)
        .await?;

        debug!("Saved account {}", account.user_id);
        Ok(())
    }

    /// Delete an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Load the persisted selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load_selection(&self) -> Result<Selection> {
        let rows = sqlx::query("SELECT key, value FROM app_state")
            .fetch_all(&self.pool)
            .await?;

        let mut selection = Selection::default();
        for row in &rows {
            let value: i64 = row.get("value");
            match row.get::<String, _>("key").as_str() {
                CURRENT_USER_KEY => selection.user_id = Some(UserId::new(value)),
                CURRENT_MAILBOX_KEY => selection.mailbox_id = MailboxId::new(value),
                _ => {}
            }
        }
        Ok(selection)
    }

    /// Persist the selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save_selection(&self, selection: &Selection) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        match selection.user_id {
            Some(user_id) => {
                sqlx::query("INSERT OR REPLACE INTO app_state (key, value) VALUES (?, ?)")
                    .bind(CURRENT_USER_KEY)
                    .bind(user_id.0)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM app_state WHERE key = ?")
                    .bind(CURRENT_USER_KEY)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("INSERT OR REPLACE INTO app_state (key, value) VALUES (?, ?)")
            .bind(CURRENT_MAILBOX_KEY)
            .bind(selection.mailbox_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Convert a database row to an Account.
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    let user_id = UserId::new(row.get("user_id"));
    let email: Option<String> = row.get("email");
    let user = email.map(|email| UserProfile {
        id: user_id,
        display_name: row.get::<Option<String>, _>("display_name").unwrap_or_default(),
        email,
        avatar: row.get("avatar"),
    });

    Account { user_id, user }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn account(id: i64, email: &str) -> Account {
        Account {
            user_id: UserId::new(id),
            user: Some(UserProfile {
                id: UserId::new(id),
                display_name: format!("User {id}"),
                email: email.to_string(),
                avatar: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_save_and_list() {
        let repo = AccountRepository::in_memory().await.unwrap();
        repo.save(&account(1, "a@example.com")).await.unwrap();
        repo.save(&account(2, "b@example.com")).await.unwrap();

        let accounts = repo.list().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0], account(1, "a@example.com"));
        assert_eq!(accounts[1].user_id, UserId::new(2));
    }

    #[tokio::test]
    async fn test_save_updates_profile() {
        let repo = AccountRepository::in_memory().await.unwrap();
        repo.save(&account(1, "a@example.com")).await.unwrap();
        repo.save(&account(1, "new@example.com")).await.unwrap();

        let accounts = repo.list().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].user.as_ref().unwrap().email, "new@example.com");
    }

    #[tokio::test]
    async fn test_account_without_profile() {
        let repo = AccountRepository::in_memory().await.unwrap();
        repo.save(&Account::new(UserId::new(3))).await.unwrap();

        let accounts = repo.list().await.unwrap();
        assert_eq!(accounts, vec![Account::new(UserId::new(3))]);
    }

    #[tokio::test]
    async fn test_delete_account() {
        let repo = AccountRepository::in_memory().await.unwrap();
        repo.save(&account(1, "a@example.com")).await.unwrap();
        repo.delete(UserId::new(1)).await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_selection_round_trip() {
        let repo = AccountRepository::in_memory().await.unwrap();
        assert_eq!(repo.load_selection().await.unwrap(), Selection::default());

        let selection = Selection {
            user_id: Some(UserId::new(4)),
            mailbox_id: MailboxId::new(9),
        };
        repo.save_selection(&selection).await.unwrap();
        assert_eq!(repo.load_selection().await.unwrap(), selection);

        let cleared = Selection::default();
        repo.save_selection(&cleared).await.unwrap();
        assert_eq!(repo.load_selection().await.unwrap(), cleared);
    }
}
