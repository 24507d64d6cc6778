//! Push notification topics.
//!
//! Each mailbox publishes on its own topic; a user's subscription lists the
//! topics the device currently receives.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::Result;
use crate::account::UserId;
use crate::api::ApiFetcher;

/// Topics a user is subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    /// Topic names.
    pub topics: BTreeSet<String>,
}

impl Subscription {
    /// Returns true if `topic` is part of the subscription.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }
}

/// Registers topics with the push backend.
#[async_trait]
pub trait PushNotificationService: Send + Sync {
    /// Subscribes the user of `api_fetcher` to `topics` unless already done.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration fails.
    async fn update_topics_if_needed(&self, topics: &[String], api_fetcher: &ApiFetcher)
    -> Result<()>;

    /// Current subscription of `user_id`, if any.
    async fn subscription_for_user(&self, user_id: UserId) -> Option<Subscription>;
}

/// Keeps subscriptions in memory.
#[derive(Debug, Default)]
pub struct LocalPushRegistry {
    subscriptions: DashMap<UserId, Subscription>,
}

impl LocalPushRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushNotificationService for LocalPushRegistry {
    async fn update_topics_if_needed(
        &self,
        topics: &[String],
        api_fetcher: &ApiFetcher,
    ) -> Result<()> {
        let user_id = api_fetcher.user_id();
        let mut subscription = self.subscriptions.entry(user_id).or_default();
        let before = subscription.topics.len();
        subscription.topics.extend(topics.iter().cloned());
        if subscription.topics.len() != before {
            debug!(user_id = %user_id, "Subscribed to {} topic(s)", subscription.topics.len() - before);
        }
        Ok(())
    }

    async fn subscription_for_user(&self, user_id: UserId) -> Option<Subscription> {
        self.subscriptions.get(&user_id).map(|s| s.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use mailroom_oauth::Token;

    use super::*;
    use crate::api::{Authenticator, HttpMailApi, MailApi};

    struct NoAuth;

    #[async_trait]
    impl Authenticator for NoAuth {
        async fn exchange_code(&self, _: &str, _: &str) -> mailroom_oauth::Result<Token> {
            Err(mailroom_oauth::Error::NoRefreshToken)
        }

        async fn refresh(&self, _: &Token) -> mailroom_oauth::Result<Token> {
            Err(mailroom_oauth::Error::NoRefreshToken)
        }
    }

    #[tokio::test]
    async fn test_topics_accumulate_per_user() {
        let registry = LocalPushRegistry::new();
        let api: Arc<dyn MailApi> = Arc::new(HttpMailApi::infomaniak().unwrap());
        let fetcher = ApiFetcher::new(Token::new("a", "Bearer", 3), api, Arc::new(NoAuth));

        assert!(registry.subscription_for_user(UserId::new(3)).await.is_none());

        registry
            .update_topics_if_needed(&["mailbox-1".into()], &fetcher)
            .await
            .unwrap();
        registry
            .update_topics_if_needed(&["mailbox-1".into(), "mailbox-2".into()], &fetcher)
            .await
            .unwrap();

        let subscription = registry.subscription_for_user(UserId::new(3)).await.unwrap();
        assert_eq!(subscription.topics.len(), 2);
        assert!(subscription.contains("mailbox-2"));
    }
}
