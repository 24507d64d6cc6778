//! Tokens and token endpoint payloads.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Seconds before expiry at which a token is already treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access token of one user.
///
/// The login service binds every token to exactly one user, so the owning
/// user id travels with the token and is the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer credential sent to the API.
    pub access_token: String,
    /// Authorization scheme, `Bearer` in practice.
    pub token_type: String,
    /// User the token was issued for.
    pub user_id: i64,
    /// When the access token stops working; `None` means never.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Long-lived credential used to get the next access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope granted by the login service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// Creates a token that never expires and cannot be refreshed.
    #[must_use]
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>, user_id: i64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            user_id,
            expires_at: None,
            refresh_token: None,
            scope: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the granted scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// True once the token is within a minute of its expiry.
    ///
    /// Tokens without an expiry never expire.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= at)
    }

    /// Returns the refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] if the token cannot be refreshed.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token.as_deref().ok_or(Error::NoRefreshToken)
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

fn bearer() -> String {
    "Bearer".into()
}

/// Successful answer of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Authorization scheme; `Bearer` when omitted.
    #[serde(default = "bearer")]
    pub token_type: String,
    /// Missing on refresh answers; the caller fills it in.
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Refresh token, absent when the service does not rotate it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
}

impl TryFrom<TokenResponse> for Token {
    type Error = Error;

    fn try_from(response: TokenResponse) -> Result<Self> {
        let user_id = response
            .user_id
            .ok_or_else(|| Error::InvalidResponse("missing user_id".into()))?;
        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            user_id,
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            refresh_token: response.refresh_token,
            scope: response.scope,
        })
    }
}

/// Failed answer of the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code, e.g. `invalid_grant`.
    pub error: String,
    /// Human-readable detail.
    #[serde(default)]
    pub error_description: String,
}

impl From<ErrorResponse> for Error {
    fn from(response: ErrorResponse) -> Self {
        Self::oauth_error(response.error, response.error_description)
    }
}
