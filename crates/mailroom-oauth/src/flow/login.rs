//! Browser login with PKCE.

use url::Url;

use super::{OAuthClient, PkceChallenge};

/// One pending browser login.
///
/// The app opens [`url`](Self::url), keeps the [`verifier`](Self::verifier)
/// until the redirect comes back, then hands both the code and the verifier
/// to [`OAuthClient::exchange_code`].
#[derive(Debug, Clone)]
pub struct LoginRequest {
    url: Url,
    pkce: PkceChallenge,
}

impl LoginRequest {
    pub(super) fn new(client: &OAuthClient, pkce: PkceChallenge) -> Self {
        let mut url = client.provider.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &client.client_id)
                .append_pair("response_type", "code")
                .append_pair("access_type", "offline")
                .append_pair("code_challenge", pkce.challenge())
                .append_pair("code_challenge_method", pkce.method());
            if let Some(redirect_uri) = &client.redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
            if !client.provider.default_scopes.is_empty() {
                query.append_pair("scope", &client.provider.default_scopes.join(" "));
            }
        }
        Self { url, pkce }
    }

    /// Page to open in a browser.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Verifier to send along with the code.
    #[must_use]
    pub fn verifier(&self) -> &str {
        self.pkce.verifier()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::Provider;

    fn query(request: &LoginRequest, key: &str) -> Option<String> {
        request
            .url()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    fn client(scopes: Vec<String>) -> OAuthClient {
        let provider = Provider::infomaniak()
            .unwrap()
            .with_default_scopes(scopes);
        OAuthClient::new("mail-ios", provider)
    }

    #[test]
    fn test_login_url_binds_the_verifier() {
        let request = client(Vec::new())
            .with_redirect_uri("com.example.mail://oauth2redirect")
            .start_login();

        assert_eq!(request.url().host_str(), Some("login.infomaniak.com"));
        assert_eq!(query(&request, "client_id").as_deref(), Some("mail-ios"));
        assert_eq!(query(&request, "response_type").as_deref(), Some("code"));
        assert_eq!(
            query(&request, "redirect_uri").as_deref(),
            Some("com.example.mail://oauth2redirect")
        );
        assert_eq!(query(&request, "code_challenge_method").as_deref(), Some("S256"));
        let challenge = PkceChallenge::from_verifier(request.verifier());
        assert_eq!(
            query(&request, "code_challenge").as_deref(),
            Some(challenge.challenge())
        );
    }

    #[test]
    fn test_scope_comes_from_the_provider() {
        let request = client(vec!["mail".into(), "contacts".into()]).start_login();
        assert_eq!(query(&request, "scope").as_deref(), Some("mail contacts"));

        let request = client(Vec::new()).start_login();
        assert!(query(&request, "scope").is_none());
        assert!(query(&request, "redirect_uri").is_none());
    }

    #[test]
    fn test_every_login_gets_its_own_verifier() {
        let client = client(Vec::new());
        assert_ne!(client.start_login().verifier(), client.start_login().verifier());
    }
}
