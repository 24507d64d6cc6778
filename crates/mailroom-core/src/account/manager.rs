//! The account manager.
//!
//! Single source of truth for who is logged in and which mailbox is active,
//! and the factory for every per-user and per-mailbox runtime object.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use mailroom_oauth::Token;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use super::credentials::TokenStore;
use super::error::AccountManagerError;
use super::model::{Account, AccountEvent, Selection, UserId};
use super::repository::AccountRepository;
use crate::api::{ApiFetcher, Authenticator, MailApi, RefreshTokenDelegate};
use crate::config::CoreConfig;
use crate::contacts::{ContactManager, DeviceContactSource};
use crate::mailbox::{FolderRole, Mailbox, MailboxId, MailboxInfoRepository, MailboxManager};
use crate::push::PushNotificationService;
use crate::store::StoreLocation;
use crate::{Error, Result};

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 32;

/// External services the account manager depends on.
#[derive(Clone)]
pub struct Collaborators {
    /// Where tokens are kept.
    pub token_store: Arc<dyn TokenStore>,
    /// Code exchange and token refresh.
    pub authenticator: Arc<dyn Authenticator>,
    /// Remote mail API.
    pub api: Arc<dyn MailApi>,
    /// Push topic registration.
    pub push: Arc<dyn PushNotificationService>,
    /// Device address book.
    pub device_contacts: Arc<dyn DeviceContactSource>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Manages accounts, the current selection and the runtime object caches.
///
/// Mailbox managers are cached by mailbox object id, contact managers by user
/// id string and API fetchers by user id. Lookups never fail: a missing
/// entry is built and cached, or `None` is returned when the user has no
/// token.
pub struct AccountManager {
    config: CoreConfig,
    location: StoreLocation,
    collaborators: Collaborators,
    account_repository: AccountRepository,
    mailbox_infos: MailboxInfoRepository,
    accounts: RwLock<Vec<Account>>,
    selection: RwLock<Selection>,
    mailbox_managers: DashMap<String, Arc<MailboxManager>>,
    contact_managers: DashMap<String, Arc<ContactManager>>,
    api_fetchers: DashMap<UserId, Arc<ApiFetcher>>,
    events: broadcast::Sender<AccountEvent>,
    weak_self: Weak<Self>,
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("location", &self.location)
            .field("mailbox_managers", &self.mailbox_managers.len())
            .field("contact_managers", &self.contact_managers.len())
            .field("api_fetchers", &self.api_fetchers.len())
            .finish_non_exhaustive()
    }
}

impl AccountManager {
    /// Opens the app stores and restores accounts and selection.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a store cannot be opened.
    pub async fn new(config: CoreConfig, collaborators: Collaborators) -> Result<Arc<Self>> {
        config.validate()?;
        let location = config.store_location();
        let account_repository = AccountRepository::new(&location).await?;
        let mailbox_infos = MailboxInfoRepository::new(&location).await?;

        let accounts = account_repository.list().await?;
        let mut selection = account_repository.load_selection().await?;
        if selection
            .user_id
            .is_some_and(|id| !accounts.iter().any(|a| a.user_id == id))
        {
            warn!("Stored selection points to an unknown account, clearing it");
            selection = Selection::default();
        }
        info!("Restored {} account(s)", accounts.len());

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new_cyclic(|weak_self| Self {
            config,
            location,
            collaborators,
            account_repository,
            mailbox_infos,
            accounts: RwLock::new(accounts),
            selection: RwLock::new(selection),
            mailbox_managers: DashMap::new(),
            contact_managers: DashMap::new(),
            api_fetchers: DashMap::new(),
            events,
            weak_self: weak_self.clone(),
        }))
    }

    /// Receives account events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn emit(&self, event: AccountEvent) {
        // No receiver is fine.
        let _ = self.events.send(event);
    }

    // Accounts and selection

    /// All accounts, in login order.
    pub async fn accounts(&self) -> Vec<Account> {
        self.accounts.read().await.clone()
    }

    /// Account of `user_id`.
    pub async fn account(&self, user_id: UserId) -> Option<Account> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| a.user_id == user_id)
            .cloned()
    }

    /// Current selection.
    pub async fn selection(&self) -> Selection {
        *self.selection.read().await
    }

    /// Selected account.
    pub async fn current_account(&self) -> Option<Account> {
        let user_id = self.selection.read().await.user_id?;
        self.account(user_id).await
    }

    /// Selected mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox store fails.
    pub async fn current_mailbox(&self) -> Result<Option<Mailbox>> {
        let selection = self.selection().await;
        let Some(user_id) = selection.user_id else {
            return Ok(None);
        };
        if selection.mailbox_id.is_none() {
            return Ok(None);
        }
        self.mailbox_infos.mailbox(selection.mailbox_id, user_id).await
    }

    /// Manager of the selected mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox store fails.
    pub async fn current_mailbox_manager(&self) -> Result<Option<Arc<MailboxManager>>> {
        Ok(self
            .current_mailbox()
            .await?
            .and_then(|mailbox| self.get_mailbox_manager(&mailbox)))
    }

    /// Locally known mailboxes of `user_id`, primary first.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox store fails.
    pub async fn mailboxes(&self, user_id: UserId) -> Result<Vec<Mailbox>> {
        self.mailbox_infos.mailboxes_for_user(user_id).await
    }

    async fn set_selection(&self, selection: Selection) -> Result<()> {
        *self.selection.write().await = selection;
        self.account_repository.save_selection(&selection).await?;
        if let Some(user_id) = selection.user_id {
            self.emit(AccountEvent::CurrentMailboxChanged {
                user_id,
                mailbox_id: selection.mailbox_id,
            });
        }
        Ok(())
    }

    // Login and refresh

    /// Logs in with an authorization code and makes the new account current.
    ///
    /// On any failure after the token was obtained, the token and the
    /// partially created account are removed again before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailbox`] if the user has no mailbox, or the error
    /// of the failing step.
    pub async fn create_and_set_current_account(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<Account> {
        let token = self
            .collaborators
            .authenticator
            .exchange_code(code, code_verifier)
            .await?;
        let user_id = UserId::new(token.user_id);
        self.collaborators.token_store.add_token(&token)?;

        let api_fetcher = Arc::new(self.new_api_fetcher(token));
        self.api_fetchers.insert(user_id, Arc::clone(&api_fetcher));
        let existed = self.account(user_id).await.is_some();

        match self.create_account(user_id, &api_fetcher).await {
            Ok(account) => {
                info!(user_id = %user_id, "Account created");
                Ok(account)
            }
            Err(e) => {
                warn!(user_id = %user_id, "Login failed, rolling back: {e}");
                self.roll_back_account(user_id, existed).await;
                Err(e)
            }
        }
    }

    async fn create_account(&self, user_id: UserId, api_fetcher: &ApiFetcher) -> Result<Account> {
        let (user, mailboxes) = fetch_user_and_mailboxes(api_fetcher).await?;
        if mailboxes.is_empty() {
            return Err(Error::NoMailbox);
        }

        let account = Account {
            user_id,
            user: Some(user),
        };
        self.save_account(&account).await?;

        let previous = self.mailbox_infos.mailboxes_for_user(user_id).await?;
        let mailboxes = with_previous_metadata(with_owner(mailboxes, user_id), &previous);
        self.mailbox_infos.store_mailboxes(user_id, &mailboxes).await?;
        let mailboxes = self.fetch_mailboxes_metadata(mailboxes, api_fetcher).await;
        self.mailbox_infos.store_mailboxes(user_id, &mailboxes).await?;

        let primary = mailboxes
            .iter()
            .find(|m| m.is_primary)
            .or_else(|| mailboxes.first())
            .cloned()
            .ok_or(Error::NoMailbox)?;
        let manager = self.get_mailbox_manager(&primary).ok_or(
            AccountManagerError::MissingMailboxManager {
                user_id,
                mailbox_id: primary.mailbox_id,
            },
        )?;

        let topics = [primary.notification_topic_name()];
        if let Err(e) = self
            .collaborators
            .push
            .update_topics_if_needed(&topics, api_fetcher)
            .await
        {
            warn!(user_id = %user_id, "Push registration failed: {e}");
        }

        manager.refresh_folders().await?;
        self.set_selection(Selection {
            user_id: Some(user_id),
            mailbox_id: primary.mailbox_id,
        })
        .await?;
        Ok(account)
    }

    /// Undoes a failed login.
    ///
    /// A user who was already logged in loses the account as well, so it is
    /// deselected and reported as removed.
    async fn roll_back_account(&self, user_id: UserId, existed: bool) {
        if self.selection().await.user_id == Some(user_id)
            && let Err(e) = self.set_selection(Selection::default()).await
        {
            error!(user_id = %user_id, "Selection not cleared: {e}");
        }
        if let Err(e) = self.collaborators.token_store.remove_token_for(user_id) {
            error!(
                "{}",
                AccountManagerError::TokenDeletion {
                    user_id,
                    reason: e.to_string()
                }
            );
        }
        if let Err(e) = self.discard_account_data(user_id).await {
            error!(user_id = %user_id, "Rollback incomplete: {e}");
        }
        if existed {
            self.emit(AccountEvent::AccountRemoved(user_id));
        }
    }

    /// Re-fetches the profile and mailboxes of `account`.
    ///
    /// Mailboxes gone remotely are deleted with their stores; if the current
    /// mailbox was one of them another mailbox of the user is selected. A
    /// user left without mailboxes is removed entirely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailbox`] if the user has no mailbox left, or the
    /// error of the failing step.
    pub async fn update_user(&self, account: &Account) -> Result<Account> {
        let user_id = account.user_id;
        let api_fetcher = self
            .get_api_fetcher(user_id)
            .ok_or(AccountManagerError::MissingApiFetcher(user_id))?;

        let (user, mailboxes) = fetch_user_and_mailboxes(&api_fetcher).await?;
        if mailboxes.is_empty() {
            warn!(user_id = %user_id, "User has no mailbox left, removing account");
            self.remove_account_for(user_id).await?;
            return Err(Error::NoMailbox);
        }

        let account = Account {
            user_id,
            user: Some(user),
        };
        self.save_account(&account).await?;

        let previous = self.mailbox_infos.mailboxes_for_user(user_id).await?;
        let mailboxes = with_previous_metadata(with_owner(mailboxes, user_id), &previous);
        let mailboxes = self.fetch_mailboxes_metadata(mailboxes, &api_fetcher).await;
        let removed = self.mailbox_infos.store_mailboxes(user_id, &mailboxes).await?;

        for mailbox in &removed {
            info!(user_id = %user_id, mailbox_id = %mailbox.mailbox_id, "Mailbox gone, deleting its store");
            if let Some((_, manager)) = self.mailbox_managers.remove(&mailbox.object_id()) {
                manager.close().await;
            }
            self.location
                .delete_mailbox_files(user_id, mailbox.mailbox_id)
                .await?;
        }
        // Managers hold a copy of their mailbox; rebuild them with the new metadata.
        self.mailbox_managers
            .retain(|_, manager| manager.user_id() != user_id);

        let selection = self.selection().await;
        if selection.user_id == Some(user_id)
            && removed.iter().any(|m| m.mailbox_id == selection.mailbox_id)
        {
            let next = first_available(&mailboxes).map_or(MailboxId::NONE, |m| m.mailbox_id);
            self.set_selection(Selection {
                user_id: Some(user_id),
                mailbox_id: next,
            })
            .await?;
        }

        debug!(user_id = %user_id, "User updated");
        Ok(account)
    }

    /// Runs [`update_user`](Self::update_user) for every account, logging failures.
    pub async fn refresh_all_accounts(&self) -> usize {
        let mut refreshed = 0;
        for account in self.accounts().await {
            match self.update_user(&account).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(user_id = %account.user_id, "Account refresh failed: {e}"),
            }
        }
        refreshed
    }

    /// Fetches permissions, external mail settings and, for limited
    /// mailboxes, quotas of every available mailbox concurrently.
    ///
    /// Failures are ignored; the mailbox keeps its previous values.
    pub async fn fetch_mailboxes_metadata(
        &self,
        mailboxes: Vec<Mailbox>,
        api_fetcher: &ApiFetcher,
    ) -> Vec<Mailbox> {
        join_all(
            mailboxes
                .into_iter()
                .map(|mailbox| fetch_mailbox_metadata(mailbox, api_fetcher)),
        )
        .await
    }

    async fn save_account(&self, account: &Account) -> Result<()> {
        self.account_repository.save(account).await?;
        let mut accounts = self.accounts.write().await;
        match accounts.iter_mut().find(|a| a.user_id == account.user_id) {
            Some(existing) => existing.clone_from(account),
            None => accounts.push(account.clone()),
        }
        Ok(())
    }

    // Switching

    /// Makes `user_id` current, selecting its primary (or first available) mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown user.
    pub async fn switch_account(&self, user_id: UserId) -> Result<()> {
        if self.account(user_id).await.is_none() {
            return Err(Error::AccountNotFound(user_id));
        }
        let mailboxes = self.mailboxes(user_id).await?;
        let mailbox_id = mailboxes
            .iter()
            .find(|m| m.is_primary && m.is_available())
            .or_else(|| first_available(&mailboxes))
            .map_or(MailboxId::NONE, |m| m.mailbox_id);

        info!(user_id = %user_id, mailbox_id = %mailbox_id, "Switching account");
        self.set_selection(Selection {
            user_id: Some(user_id),
            mailbox_id,
        })
        .await
    }

    /// Makes `mailbox` current and reconciles push topics in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection cannot be persisted.
    pub async fn switch_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        self.set_selection(Selection {
            user_id: Some(mailbox.user_id),
            mailbox_id: mailbox.mailbox_id,
        })
        .await?;

        if let Some(this) = self.weak_self.upgrade() {
            let mailbox = mailbox.clone();
            tokio::spawn(async move {
                if let Err(e) = this.reconcile_push_topics(&mailbox).await {
                    warn!(mailbox_id = %mailbox.mailbox_id, "Push topics not updated: {e}");
                }
            });
        }
        Ok(())
    }

    /// Subscribes to the topic of `mailbox` unless already subscribed.
    ///
    /// # Errors
    ///
    /// Returns the [`AccountManagerError`] explaining why nothing was done.
    pub async fn reconcile_push_topics(
        &self,
        mailbox: &Mailbox,
    ) -> std::result::Result<(), AccountManagerError> {
        let user_id = mailbox.user_id;
        let manager = self.get_mailbox_manager(mailbox).ok_or(
            AccountManagerError::MissingMailboxManager {
                user_id,
                mailbox_id: mailbox.mailbox_id,
            },
        )?;

        let inbox = manager.folder(FolderRole::Inbox).await.unwrap_or_else(|e| {
            debug!("Inbox lookup failed: {e}");
            None
        });
        if inbox.and_then(|folder| folder.cursor).is_none() {
            return Err(AccountManagerError::MissingFolder(mailbox.mailbox_id));
        }

        let subscription = self
            .collaborators
            .push
            .subscription_for_user(user_id)
            .await
            .ok_or(AccountManagerError::MissingSubscription(user_id))?;
        let topic = mailbox.notification_topic_name();
        if subscription.contains(&topic) {
            return Err(AccountManagerError::TopicAlreadyPresent(topic));
        }

        let mut topics: Vec<String> = subscription.topics.into_iter().collect();
        topics.push(topic);
        if let Err(e) = self
            .collaborators
            .push
            .update_topics_if_needed(&topics, manager.api_fetcher())
            .await
        {
            warn!(user_id = %user_id, "Push registration failed: {e}");
        }
        Ok(())
    }

    /// Keeps the current mailbox if it is usable, otherwise selects the first
    /// available mailbox of the current user, or none.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox store fails.
    pub async fn switch_to_first_valid_mailbox_manager(&self) -> Result<Option<Arc<MailboxManager>>> {
        let selection = self.selection().await;
        let Some(user_id) = selection.user_id else {
            return Ok(None);
        };

        if let Some(current) = self.current_mailbox().await?
            && current.is_available()
        {
            return Ok(self.get_mailbox_manager(&current));
        }

        let mailboxes = self.mailboxes(user_id).await?;
        match first_available(&mailboxes) {
            Some(mailbox) => {
                self.switch_mailbox(mailbox).await?;
                Ok(self.get_mailbox_manager(mailbox))
            }
            None => {
                warn!(user_id = %user_id, "No usable mailbox");
                self.set_selection(Selection {
                    user_id: Some(user_id),
                    mailbox_id: MailboxId::NONE,
                })
                .await?;
                Ok(None)
            }
        }
    }

    // Mailbox management

    /// Attaches a mailbox to the current user and selects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentAccount`] without a current account, or the
    /// API or store error.
    pub async fn add_mailbox(&self, mail: &str, password: &str) -> Result<Mailbox> {
        let account = self.current_account().await.ok_or(Error::NoCurrentAccount)?;
        let user_id = account.user_id;
        let api_fetcher = self
            .get_api_fetcher(user_id)
            .ok_or(AccountManagerError::MissingApiFetcher(user_id))?;

        let mailbox_id = api_fetcher
            .perform(|api, token| async move { api.add_mailbox(&token, mail, password).await })
            .await?;
        self.update_user(&account).await?;

        let mailbox = self
            .mailbox_infos
            .mailbox(mailbox_id, user_id)
            .await?
            .ok_or(AccountManagerError::MissingMailbox {
                user_id,
                mailbox_id,
            })?;
        self.switch_mailbox(&mailbox).await?;
        Ok(mailbox)
    }

    /// Detaches `mailbox` from its user and refreshes the user.
    ///
    /// # Errors
    ///
    /// Returns the API or store error.
    pub async fn detach_mailbox(&self, mailbox: &Mailbox) -> Result<()> {
        let user_id = mailbox.user_id;
        let account = self
            .account(user_id)
            .await
            .ok_or(Error::AccountNotFound(user_id))?;
        let api_fetcher = self
            .get_api_fetcher(user_id)
            .ok_or(AccountManagerError::MissingApiFetcher(user_id))?;

        api_fetcher
            .perform(|api, token| async move { api.detach_mailbox(&token, mailbox).await })
            .await?;
        self.update_user(&account).await?;
        Ok(())
    }

    // Runtime object caches

    /// Manager of `mailbox`, the same instance for the same mailbox and user.
    ///
    /// Returns `None` if the owner has no token.
    pub fn get_mailbox_manager(&self, mailbox: &Mailbox) -> Option<Arc<MailboxManager>> {
        let key = mailbox.object_id();
        if let Some(manager) = self.mailbox_managers.get(&key) {
            return Some(Arc::clone(&manager));
        }

        let api_fetcher = self.get_api_fetcher(mailbox.user_id)?;
        let contact_manager = self.get_contact_manager(mailbox.user_id)?;
        let manager = self.mailbox_managers.entry(key).or_insert_with(|| {
            debug!(user_id = %mailbox.user_id, mailbox_id = %mailbox.mailbox_id, "New mailbox manager");
            Arc::new(MailboxManager::new(
                self.location.clone(),
                mailbox.clone(),
                api_fetcher,
                contact_manager,
            ))
        });
        Some(Arc::clone(&manager))
    }

    /// Contact manager of `user_id`, the same instance for the same user.
    ///
    /// Returns `None` if the user has no token.
    pub fn get_contact_manager(&self, user_id: UserId) -> Option<Arc<ContactManager>> {
        let key = user_id.to_string();
        if let Some(manager) = self.contact_managers.get(&key) {
            return Some(Arc::clone(&manager));
        }

        let api_fetcher = self.get_api_fetcher(user_id)?;
        let manager = self.contact_managers.entry(key).or_insert_with(|| {
            Arc::new(ContactManager::new(
                &self.config,
                api_fetcher,
                Arc::clone(&self.collaborators.device_contacts),
            ))
        });
        Some(Arc::clone(&manager))
    }

    /// API fetcher of `user_id`, the same instance for the same user.
    ///
    /// Returns `None` if the user has no token.
    pub fn get_api_fetcher(&self, user_id: UserId) -> Option<Arc<ApiFetcher>> {
        if let Some(fetcher) = self.api_fetchers.get(&user_id) {
            return Some(Arc::clone(&fetcher));
        }

        let token = match self.collaborators.token_store.token_for(user_id) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(user_id = %user_id, "No token stored");
                return None;
            }
            Err(e) => {
                warn!(user_id = %user_id, "Token lookup failed: {e}");
                return None;
            }
        };
        let fetcher = self
            .api_fetchers
            .entry(user_id)
            .or_insert_with(|| Arc::new(self.new_api_fetcher(token)));
        Some(Arc::clone(&fetcher))
    }

    fn new_api_fetcher(&self, token: Token) -> ApiFetcher {
        let delegate: Weak<dyn RefreshTokenDelegate> = self.weak_self.clone();
        ApiFetcher::new(
            token,
            Arc::clone(&self.collaborators.api),
            Arc::clone(&self.collaborators.authenticator),
        )
        .with_delegate(delegate)
    }

    // Removal

    /// Logs out `user_id` and deletes everything stored for it.
    ///
    /// Clears the selection if it was the current user and empties all three
    /// runtime caches.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be updated or a file cannot be deleted.
    pub async fn remove_account_for(&self, user_id: UserId) -> Result<()> {
        if self.selection().await.user_id == Some(user_id) {
            self.set_selection(Selection::default()).await?;
        }

        match self.collaborators.token_store.remove_token_for(user_id) {
            Ok(Some(_)) => {}
            Ok(None) => debug!("{}", AccountManagerError::TokenRemoval(user_id)),
            Err(e) => error!(
                "{}",
                AccountManagerError::TokenDeletion {
                    user_id,
                    reason: e.to_string()
                }
            ),
        }

        self.discard_account_data(user_id).await?;
        info!(user_id = %user_id, "Account removed");
        self.emit(AccountEvent::AccountRemoved(user_id));
        Ok(())
    }

    /// Forgets the account, closes its stores, clears the caches and deletes its files.
    async fn discard_account_data(&self, user_id: UserId) -> Result<()> {
        self.accounts.write().await.retain(|a| a.user_id != user_id);
        self.account_repository.delete(user_id).await?;
        self.mailbox_infos.remove_for_user(user_id).await?;

        let mailbox_managers: Vec<_> = self
            .mailbox_managers
            .iter()
            .filter(|entry| entry.value().user_id() == user_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for manager in mailbox_managers {
            manager.close().await;
        }
        let contact_manager = self
            .contact_managers
            .get(&user_id.to_string())
            .map(|entry| Arc::clone(entry.value()));
        if let Some(manager) = contact_manager {
            manager.close().await;
        }

        self.mailbox_managers.clear();
        self.contact_managers.clear();
        self.api_fetchers.clear();

        let removed = self.location.delete_user_files(user_id).await?;
        debug!(user_id = %user_id, "Deleted {removed} store file(s)");
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenDelegate for AccountManager {
    async fn did_update_token(&self, token: &Token) {
        if let Err(e) = self.collaborators.token_store.add_token(token) {
            error!(user_id = token.user_id, "Failed to store refreshed token: {e}");
        }
    }

    async fn did_fail_refresh_token(&self, token: &Token) {
        let user_id = UserId::new(token.user_id);
        match self.collaborators.token_store.remove_token_for(user_id) {
            Ok(Some(_)) => {}
            Ok(None) => warn!("{}", AccountManagerError::TokenRemoval(user_id)),
            Err(e) => error!(
                "{}",
                AccountManagerError::TokenDeletion {
                    user_id,
                    reason: e.to_string()
                }
            ),
        }
        self.api_fetchers.remove(&user_id);

        if self.selection().await.user_id != Some(user_id) {
            return;
        }
        warn!(user_id = %user_id, "Token refresh failed for the active account, logging out");
        if let Err(e) = self.remove_account_for(user_id).await {
            error!(user_id = %user_id, "Forced logout incomplete: {e}");
        }
        self.emit(AccountEvent::Disconnected(user_id));
    }
}

async fn fetch_user_and_mailboxes(
    api_fetcher: &ApiFetcher,
) -> Result<(super::UserProfile, Vec<Mailbox>)> {
    let user = api_fetcher
        .perform(|api, token| async move { api.user_profile(&token).await })
        .await?;
    let mailboxes = api_fetcher
        .perform(|api, token| async move { api.mailboxes(&token).await })
        .await?;
    Ok((user, mailboxes))
}

fn with_owner(mut mailboxes: Vec<Mailbox>, user_id: UserId) -> Vec<Mailbox> {
    for mailbox in &mut mailboxes {
        mailbox.user_id = user_id;
    }
    mailboxes
}

/// Seeds fresh mailboxes with the metadata stored for them last time, so a
/// failed fetch leaves the old values in place.
fn with_previous_metadata(mut mailboxes: Vec<Mailbox>, previous: &[Mailbox]) -> Vec<Mailbox> {
    for mailbox in &mut mailboxes {
        let Some(old) = previous.iter().find(|m| m.mailbox_id == mailbox.mailbox_id) else {
            continue;
        };
        if mailbox.permissions.is_none() {
            mailbox.permissions.clone_from(&old.permissions);
        }
        if mailbox.external_mail_flag.is_none() {
            mailbox.external_mail_flag.clone_from(&old.external_mail_flag);
        }
        if mailbox.quotas.is_none() {
            mailbox.quotas.clone_from(&old.quotas);
        }
    }
    mailboxes
}

fn first_available(mailboxes: &[Mailbox]) -> Option<&Mailbox> {
    mailboxes.iter().find(|m| m.is_available())
}

async fn fetch_mailbox_metadata(mut mailbox: Mailbox, api_fetcher: &ApiFetcher) -> Mailbox {
    if !mailbox.is_available() {
        return mailbox;
    }

    let (permissions, external_mail_flag, quotas) = {
        let target = &mailbox;
        tokio::join!(
            api_fetcher.perform(|api, token| async move { api.permissions(&token, target).await }),
            api_fetcher
                .perform(|api, token| async move { api.external_mail_flag(&token, target).await }),
            async {
                if target.is_limited {
                    Some(
                        api_fetcher
                            .perform(|api, token| async move { api.quotas(&token, target).await })
                            .await,
                    )
                } else {
                    None
                }
            },
        )
    };

    match permissions {
        Ok(permissions) => mailbox.permissions = Some(permissions),
        Err(e) => debug!(mailbox_id = %mailbox.mailbox_id, "Permissions unavailable: {e}"),
    }
    match external_mail_flag {
        Ok(flag) => mailbox.external_mail_flag = Some(flag),
        Err(e) => debug!(mailbox_id = %mailbox.mailbox_id, "External mail flag unavailable: {e}"),
    }
    match quotas {
        Some(Ok(quotas)) => mailbox.quotas = Some(quotas),
        Some(Err(e)) => debug!(mailbox_id = %mailbox.mailbox_id, "Quotas unavailable: {e}"),
        None => {}
    }
    mailbox
}
