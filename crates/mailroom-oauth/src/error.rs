//! Login and token errors.

/// Result of a login or token operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a login or token operation failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The token endpoint could not be reached.
    #[error("Token endpoint unreachable: {0}")]
    Http(#[from] reqwest::Error),

    /// A payload did not parse.
    #[error("Malformed token payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The login service refused the request.
    #[error("Login service refused ({error}): {description}")]
    OAuth {
        /// Standard error code, e.g. `invalid_grant`.
        error: String,
        /// Detail from the service, possibly empty.
        description: String,
    },

    /// The token carries no refresh token.
    #[error("Token cannot be refreshed")]
    NoRefreshToken,

    /// The service answered without something every token needs.
    #[error("Incomplete token answer: {0}")]
    InvalidResponse(String),

    /// The login service is misconfigured.
    #[error("Invalid login service: {0}")]
    InvalidConfig(String),

    /// An endpoint is not a URL.
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Builds a refusal from the service's error code and description.
    #[must_use]
    pub fn oauth_error(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::OAuth {
            error: error.into(),
            description: description.into(),
        }
    }

    /// True if the user must log in again.
    ///
    /// Retrying cannot help once the grant is rejected or there is nothing to
    /// refresh with.
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            Self::OAuth { error, .. } => error == "invalid_grant",
            Self::NoRefreshToken => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_grant_is_detected() {
        assert!(Error::oauth_error("invalid_grant", "revoked").is_invalid_grant());
        assert!(Error::NoRefreshToken.is_invalid_grant());
        assert!(!Error::oauth_error("temporarily_unavailable", "").is_invalid_grant());
        assert!(!Error::InvalidResponse("missing user_id".into()).is_invalid_grant());
    }
}
