//! Remote API access.
//!
//! [`MailApi`] is the raw remote surface, [`ApiFetcher`] wraps it with a
//! user's token and the refresh logic.

mod client;
mod error;
mod fetcher;
mod http;

pub use client::{Authenticator, MailApi, ProgressCallback, RefreshTokenDelegate};
pub use error::{ApiError, ApiResult};
pub use fetcher::ApiFetcher;
pub use http::HttpMailApi;
