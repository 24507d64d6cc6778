//! Remote API errors.

use crate::account::UserId;

/// Errors returned by remote API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with an error envelope.
    #[error("Server error {code}: {description}")]
    Server {
        /// Error code.
        code: String,
        /// Human-readable description.
        description: String,
    },

    /// The access token was rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Unexpected HTTP status without error body.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The refresh token is no longer accepted; the user must log in again.
    #[error("Token refresh failed for user {user_id}: {reason}")]
    TokenRefreshFailed {
        /// Owner of the token.
        user_id: UserId,
        /// Server message.
        reason: String,
    },

    /// Token refresh failed for another reason (network, server).
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailroom_oauth::Error),

    /// Invalid endpoint URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Returns true if the account cannot continue without a new login.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::TokenRefreshFailed { .. })
    }
}

/// Result type for remote API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
