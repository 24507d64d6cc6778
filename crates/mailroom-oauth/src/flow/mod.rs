//! Talking to the token endpoint.

mod login;
mod pkce;

pub use login::LoginRequest;
pub use pkce::PkceChallenge;

use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Form body posted to the token endpoint.
///
/// Mail apps are public clients: there is no secret, and codes are always
/// bound to a PKCE verifier.
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Public `OAuth2` client of one login service.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client id registered with the login service.
    pub client_id: String,
    /// Redirect URI registered with the client id.
    pub redirect_uri: Option<String>,
    /// Login service endpoints.
    pub provider: Provider,
    http_client: Client,
}

impl OAuthClient {
    /// Creates a client without a redirect URI.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Starts a login: a fresh PKCE pair and the URL to open.
    #[must_use]
    pub fn start_login(&self) -> LoginRequest {
        LoginRequest::new(self, PkceChallenge::generate())
    }

    /// Trades the code from the redirect for the user's first token.
    ///
    /// # Errors
    ///
    /// Returns an error if the login service rejects the code or its answer
    /// does not name a user.
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Token> {
        let request = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.client_id,
            code: Some(code),
            code_verifier: Some(code_verifier),
            redirect_uri: self.redirect_uri.as_deref(),
            refresh_token: None,
        };
        let token = Token::try_from(self.post(&request).await?)?;
        debug!(user_id = token.user_id, "Exchanged authorization code");
        Ok(token)
    }

    /// Gets a new access token for the owner of `token`.
    ///
    /// The user id always carries over. So does the refresh token when the
    /// service does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`](crate::Error::NoRefreshToken) without
    /// contacting the service if `token` cannot be refreshed.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let request = TokenRequest {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            code: None,
            code_verifier: None,
            redirect_uri: None,
            refresh_token: Some(token.refresh_token()?),
        };

        let mut response = self.post(&request).await?;
        response.user_id = Some(token.user_id);
        if response.refresh_token.is_none() {
            response.refresh_token.clone_from(&token.refresh_token);
        }

        debug!(user_id = token.user_id, "Refreshed access token");
        Token::try_from(response)
    }

    async fn post(&self, request: &TokenRequest<'_>) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(request)
            .send()
            .await?;
        Self::read_token(response, request.grant_type).await
    }

    async fn read_token(response: Response, grant_type: &str) -> Result<TokenResponse> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let error: ErrorResponse = response.json().await?;
        warn!(%status, grant_type, error = %error.error, "Token request rejected");
        Err(error.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        let provider = Provider::new(
            "Test",
            "https://login.example.com/authorize",
            "https://login.example.com/token",
        )
        .unwrap();
        OAuthClient::new("mail-ios", provider)
    }

    #[test]
    fn test_redirect_uri_is_optional() {
        assert!(client().redirect_uri.is_none());
        let client = client().with_redirect_uri("com.example.mail://oauth2redirect");
        assert_eq!(
            client.redirect_uri.as_deref(),
            Some("com.example.mail://oauth2redirect")
        );
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_never_hits_the_network() {
        let token = Token::new("access", "Bearer", 3);
        let error = client().refresh_token(&token).await.unwrap_err();
        assert!(error.is_invalid_grant());
    }
}
