//! Per-user authenticated API access.

use std::future::Future;
use std::sync::{Arc, Weak};

use mailroom_oauth::Token;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{Authenticator, MailApi, RefreshTokenDelegate};
use super::error::{ApiError, ApiResult};
use crate::account::UserId;

/// Token of a fetcher, and why it can no longer be refreshed.
#[derive(Debug)]
struct TokenState {
    token: Token,
    rejected: Option<String>,
}

/// Performs API calls on behalf of one user.
///
/// Holds the user's token, refreshes it when it expires or when the server
/// rejects it, and reports refresh outcomes to its delegate. Once a refresh
/// is rejected every later refresh fails at once, so the delegate hears of
/// the rejection a single time.
pub struct ApiFetcher {
    user_id: UserId,
    token: Mutex<TokenState>,
    api: Arc<dyn MailApi>,
    authenticator: Arc<dyn Authenticator>,
    delegate: Option<Weak<dyn RefreshTokenDelegate>>,
}

impl std::fmt::Debug for ApiFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiFetcher")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl ApiFetcher {
    /// Create a fetcher for the owner of `token`.
    #[must_use]
    pub fn new(token: Token, api: Arc<dyn MailApi>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            user_id: UserId::new(token.user_id),
            token: Mutex::new(TokenState {
                token,
                rejected: None,
            }),
            api,
            authenticator,
            delegate: None,
        }
    }

    /// Report refresh outcomes to `delegate`.
    #[must_use]
    pub fn with_delegate(mut self, delegate: Weak<dyn RefreshTokenDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Owner of the token.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Current token.
    pub async fn token(&self) -> Token {
        self.token.lock().await.token.clone()
    }

    /// Runs `call` with a valid token.
    ///
    /// An expired token is refreshed first. If the server answers
    /// [`ApiError::Unauthorized`], the token is refreshed and `call` runs
    /// once more.
    ///
    /// # Errors
    ///
    /// Returns the error of `call`, or [`ApiError::TokenRefreshFailed`] if the
    /// token can no longer be refreshed.
    pub async fn perform<T, F, Fut>(&self, call: F) -> ApiResult<T>
    where
        F: Fn(Arc<dyn MailApi>, Token) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let token = self.valid_token().await?;
        match call(Arc::clone(&self.api), token.clone()).await {
            Err(ApiError::Unauthorized) => {
                debug!(user_id = %self.user_id, "Token rejected, refreshing");
                let token = self.refresh(&token).await?;
                call(Arc::clone(&self.api), token).await
            }
            other => other,
        }
    }

    async fn valid_token(&self) -> ApiResult<Token> {
        let token = self.token().await;
        if token.is_expired() {
            self.refresh(&token).await
        } else {
            Ok(token)
        }
    }

    /// Refreshes `stale` unless another call already did.
    async fn refresh(&self, stale: &Token) -> ApiResult<Token> {
        let mut state = self.token.lock().await;
        if let Some(reason) = &state.rejected {
            return Err(ApiError::TokenRefreshFailed {
                user_id: self.user_id,
                reason: reason.clone(),
            });
        }
        if state.token.access_token != stale.access_token {
            return Ok(state.token.clone());
        }

        match self.authenticator.refresh(&state.token).await {
            Ok(token) => {
                state.token = token.clone();
                drop(state);
                info!(user_id = %self.user_id, "Token refreshed");
                if let Some(delegate) = self.delegate() {
                    delegate.did_update_token(&token).await;
                }
                Ok(token)
            }
            Err(e) if e.is_invalid_grant() => {
                state.rejected = Some(e.to_string());
                let rejected = state.token.clone();
                drop(state);
                warn!(user_id = %self.user_id, "Token refresh rejected: {e}");
                if let Some(delegate) = self.delegate() {
                    delegate.did_fail_refresh_token(&rejected).await;
                }
                Err(ApiError::TokenRefreshFailed {
                    user_id: self.user_id,
                    reason: e.to_string(),
                })
            }
            Err(e) => {
                drop(state);
                warn!(user_id = %self.user_id, "Token refresh failed: {e}");
                Err(e.into())
            }
        }
    }

    fn delegate(&self) -> Option<Arc<dyn RefreshTokenDelegate>> {
        self.delegate.as_ref().and_then(Weak::upgrade)
    }
}
