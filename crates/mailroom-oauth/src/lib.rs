//! # mailroom-oauth
//!
//! `OAuth2` login for the mailroom synchronization core.
//!
//! ## Features
//!
//! - **Browser login** with the authorization code flow and PKCE (S256)
//! - **Token management**: expiration checking and refresh
//! - **Provider configuration**: the Infomaniak login service or any custom provider
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailroom_oauth::{OAuthClient, Provider};
//!
//! let client = OAuthClient::new("your_client_id", Provider::infomaniak()?)
//!     .with_redirect_uri("com.example.mail://oauth2redirect");
//! let login = client.start_login();
//!
//! println!("Visit: {}", login.url());
//!
//! // After the redirect, exchange the code. The token carries the user id.
//! let token = client.exchange_code("code_from_redirect", login.verifier()).await?;
//! println!("Logged in as user {}", token.user_id);
//! ```
//!
//! ### Token Refresh
//!
//! ```ignore
//! if token.is_expired() {
//!     let token = client.refresh_token(&token).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod token;

pub use error::{Error, Result};
pub use flow::{LoginRequest, OAuthClient, PkceChallenge};
pub use provider::Provider;
pub use token::Token;
