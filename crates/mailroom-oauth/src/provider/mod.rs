//! Login service endpoints.

use url::Url;

use crate::error::{Error, Result};

const INFOMANIAK_AUTHORIZE: &str = "https://login.infomaniak.com/authorize";
const INFOMANIAK_TOKEN: &str = "https://login.infomaniak.com/token";

/// Endpoints of a login service.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Display name.
    pub name: String,
    /// Page the user logs in on.
    pub auth_url: Url,
    /// Endpoint codes and refresh tokens are traded at.
    pub token_url: Url,
    /// Scopes requested when a login starts.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a login service from its two endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if either URL does not parse or is not http(s).
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: endpoint("auth_url", auth_url.as_ref())?,
            token_url: endpoint("token_url", token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the scopes requested at login.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// The Infomaniak login service.
    ///
    /// Its tokens name the user they belong to and come with a long-lived
    /// refresh token.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the endpoints are constants.
    pub fn infomaniak() -> Result<Self> {
        Self::new("Infomaniak", INFOMANIAK_AUTHORIZE, INFOMANIAK_TOKEN)
    }
}

fn endpoint(field: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(Error::InvalidConfig(format!("{field} must be http(s)")));
    }
    Ok(url)
}
