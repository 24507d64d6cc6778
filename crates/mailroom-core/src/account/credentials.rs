//! Token storage.
//!
//! [`KeyringTokenStore`] keeps tokens in the platform's native credential
//! storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! Tokens are serialized as JSON and keyed by user id.

use dashmap::DashMap;
use keyring::Entry;
use mailroom_oauth::Token;
use tracing::{debug, warn};

use super::UserId;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailroom";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// A stored token could not be (de)serialized.
    #[error("Token serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Persists API tokens keyed by user id.
pub trait TokenStore: Send + Sync {
    /// Returns the token of `user_id`, if one is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn token_for(&self, user_id: UserId) -> CredentialResult<Option<Token>>;

    /// Stores `token` under its user id, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn add_token(&self, token: &Token) -> CredentialResult<()>;

    /// Removes and returns the token of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    fn remove_token_for(&self, user_id: UserId) -> CredentialResult<Option<Token>>;
}

/// Token store backed by the system keyring.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringTokenStore {
    /// Creates a store whose entries live under `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, user_id: UserId) -> CredentialResult<Entry> {
        Ok(Entry::new(&self.service, &format!("token_{user_id}"))?)
    }
}

impl TokenStore for KeyringTokenStore {
    fn token_for(&self, user_id: UserId) -> CredentialResult<Option<Token>> {
        match self.entry(user_id)?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => {
                debug!("No token found for user {user_id}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn add_token(&self, token: &Token) -> CredentialResult<()> {
        let json = serde_json::to_string(token)?;
        self.entry(UserId::new(token.user_id))?.set_password(&json)?;
        debug!("Stored token for user {}", token.user_id);
        Ok(())
    }

    fn remove_token_for(&self, user_id: UserId) -> CredentialResult<Option<Token>> {
        let token = self.token_for(user_id)?;
        match self.entry(user_id)?.delete_credential() {
            Ok(()) => {
                debug!("Deleted token for user {user_id}");
                Ok(token)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!("Failed to delete token for user {user_id}: {e}");
                Err(e.into())
            }
        }
    }
}

/// Token store that only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<UserId, Token>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no token is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn token_for(&self, user_id: UserId) -> CredentialResult<Option<Token>> {
        Ok(self.tokens.get(&user_id).map(|token| token.clone()))
    }

    fn add_token(&self, token: &Token) -> CredentialResult<()> {
        self.tokens.insert(UserId::new(token.user_id), token.clone());
        Ok(())
    }

    fn remove_token_for(&self, user_id: UserId) -> CredentialResult<Option<Token>> {
        Ok(self.tokens.remove(&user_id).map(|(_, token)| token))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        let token = Token::new("access", "Bearer", 5);

        store.add_token(&token).unwrap();
        assert_eq!(store.token_for(UserId::new(5)).unwrap(), Some(token.clone()));
        assert_eq!(store.remove_token_for(UserId::new(5)).unwrap(), Some(token));
        assert_eq!(store.remove_token_for(UserId::new(5)).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_replaces_token_of_same_user() {
        let store = MemoryTokenStore::new();
        store.add_token(&Token::new("old", "Bearer", 5)).unwrap();
        store.add_token(&Token::new("new", "Bearer", 5)).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.token_for(UserId::new(5)).unwrap().unwrap().access_token,
            "new"
        );
    }

    // These tests interact with the actual system keyring.
    // Run manually with `cargo test -- --ignored`

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn test_keyring_store_round_trip() {
        let store = KeyringTokenStore::new("mailroom-test");
        let token = Token::new("access", "Bearer", 99_999).with_refresh_token("refresh");

        store.add_token(&token).unwrap();
        assert_eq!(store.token_for(UserId::new(99_999)).unwrap(), Some(token.clone()));
        assert_eq!(store.remove_token_for(UserId::new(99_999)).unwrap(), Some(token));
        assert_eq!(store.token_for(UserId::new(99_999)).unwrap(), None);
    }
}
