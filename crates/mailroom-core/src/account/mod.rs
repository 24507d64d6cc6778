//! Account management module.
//!
//! Provides the account manager, account storage and token storage.

pub mod credentials;
mod error;
mod manager;
mod model;
mod repository;

pub use credentials::{
    CredentialError, CredentialResult, KeyringTokenStore, MemoryTokenStore, TokenStore,
};
pub use error::AccountManagerError;
pub use manager::{AccountManager, Collaborators};
pub use model::{Account, AccountEvent, Selection, UserId, UserProfile};
pub use repository::AccountRepository;
