//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mailroom_core::{
    AccountManager, AddressBook, ApiError, ApiFetcher, ApiResult, Attachment, Authenticator,
    Collaborators, CoreConfig, DeviceContactSource, ExternalMailInfo, Folder, FolderRole,
    InMemoryContactSource, LocalPushRegistry, MailApi, Mailbox, MailboxId, MailboxPermissions,
    MemoryTokenStore, NewContact, ProgressCallback, Quotas, RemoteContact, UserId, UserProfile,
};
use mailroom_oauth::Token;

/// A token valid for an hour.
pub fn token_for(user_id: i64) -> Token {
    Token::new(format!("access-{user_id}"), "Bearer", user_id)
        .with_expires_at(Utc::now() + Duration::hours(1))
        .with_refresh_token(format!("refresh-{user_id}"))
}

/// A usable mailbox.
pub fn mailbox(user_id: i64, mailbox_id: i64, is_primary: bool) -> Mailbox {
    Mailbox {
        mailbox_id: MailboxId::new(mailbox_id),
        user_id: UserId::new(user_id),
        uuid: format!("uuid-{mailbox_id}"),
        email: format!("box{mailbox_id}@example.com"),
        local_part: format!("box{mailbox_id}"),
        hosting_id: 1,
        is_primary,
        is_password_valid: true,
        is_locked: false,
        is_limited: false,
        permissions: None,
        external_mail_flag: None,
        quotas: None,
    }
}

pub fn remote_contact(id: &str, name: &str, emails: &[&str]) -> RemoteContact {
    RemoteContact {
        id: id.into(),
        name: name.into(),
        emails: emails.iter().map(ToString::to_string).collect(),
        avatar: None,
        address_book_id: Some(1),
    }
}

/// In-memory remote side.
#[derive(Default)]
pub struct FakeApi {
    pub mailboxes: Mutex<HashMap<i64, Vec<Mailbox>>>,
    pub contacts: Mutex<Vec<RemoteContact>>,
    pub address_books: Mutex<Vec<AddressBook>>,
    pub fail_permissions: AtomicBool,
    pub fail_address_books: AtomicBool,
    pub fail_uploads: AtomicBool,
    pub hang_uploads: AtomicBool,
    pub contacts_calls: AtomicUsize,
    pub quotas_calls: AtomicUsize,
    pub uploads_started: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_mailboxes(&self, user_id: i64, mailboxes: Vec<Mailbox>) {
        self.mailboxes.lock().unwrap().insert(user_id, mailboxes);
    }

    pub fn set_contacts(&self, contacts: Vec<RemoteContact>) {
        *self.contacts.lock().unwrap() = contacts;
    }
}

#[async_trait]
impl MailApi for FakeApi {
    async fn user_profile(&self, token: &Token) -> ApiResult<UserProfile> {
        Ok(UserProfile {
            id: UserId::new(token.user_id),
            display_name: format!("User {}", token.user_id),
            email: format!("user{}@example.com", token.user_id),
            avatar: None,
        })
    }

    async fn mailboxes(&self, token: &Token) -> ApiResult<Vec<Mailbox>> {
        Ok(self
            .mailboxes
            .lock()
            .unwrap()
            .get(&token.user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn permissions(&self, _token: &Token, _mailbox: &Mailbox) -> ApiResult<MailboxPermissions> {
        if self.fail_permissions.load(Ordering::SeqCst) {
            return Err(ApiError::Status(500));
        }
        Ok(MailboxPermissions {
            can_manage_filters: true,
            ..MailboxPermissions::default()
        })
    }

    async fn external_mail_flag(
        &self,
        _token: &Token,
        _mailbox: &Mailbox,
    ) -> ApiResult<ExternalMailInfo> {
        Ok(ExternalMailInfo {
            is_enabled: true,
            domains: vec![],
        })
    }

    async fn quotas(&self, _token: &Token, _mailbox: &Mailbox) -> ApiResult<Quotas> {
        self.quotas_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Quotas {
            size: 1024,
            size_checked_at: 0,
        })
    }

    async fn folders(&self, _token: &Token, _mailbox: &Mailbox) -> ApiResult<Vec<Folder>> {
        Ok(vec![
            Folder {
                id: "inbox".into(),
                name: "INBOX".into(),
                path: "INBOX".into(),
                role: Some(FolderRole::Inbox),
                unread_count: 2,
                cursor: Some("cursor-1".into()),
            },
            Folder {
                id: "sent".into(),
                name: "Sent".into(),
                path: "Sent".into(),
                role: None,
                unread_count: 0,
                cursor: None,
            },
        ])
    }

    async fn address_books(&self, _token: &Token) -> ApiResult<Vec<AddressBook>> {
        if self.fail_address_books.load(Ordering::SeqCst) {
            return Err(ApiError::Status(503));
        }
        Ok(self.address_books.lock().unwrap().clone())
    }

    async fn contacts(&self, _token: &Token) -> ApiResult<Vec<RemoteContact>> {
        self.contacts_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn add_contact(
        &self,
        _token: &Token,
        contact: &NewContact,
        address_book_id: i64,
    ) -> ApiResult<String> {
        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.contacts.lock().unwrap().push(RemoteContact {
            id: id.clone(),
            name: contact.name.clone(),
            emails: vec![contact.email.clone()],
            avatar: None,
            address_book_id: Some(address_book_id),
        });
        Ok(id)
    }

    async fn add_mailbox(&self, token: &Token, mail: &str, _password: &str) -> ApiResult<MailboxId> {
        let id = 1000 + i64::try_from(self.next_id.fetch_add(1, Ordering::SeqCst)).unwrap();
        let mut added = mailbox(token.user_id, id, false);
        added.email = mail.to_string();
        self.mailboxes
            .lock()
            .unwrap()
            .entry(token.user_id)
            .or_default()
            .push(added);
        Ok(MailboxId::new(id))
    }

    async fn detach_mailbox(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<()> {
        if let Some(list) = self.mailboxes.lock().unwrap().get_mut(&token.user_id) {
            list.retain(|m| m.mailbox_id != mailbox.mailbox_id);
        }
        Ok(())
    }

    async fn create_attachment(
        &self,
        _token: &Token,
        _mailbox: &Mailbox,
        data: Vec<u8>,
        metadata: &Attachment,
        progress: ProgressCallback,
    ) -> ApiResult<Attachment> {
        let n = self.uploads_started.fetch_add(1, Ordering::SeqCst) + 1;
        progress(0.5);
        if self.hang_uploads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ApiError::Status(413));
        }
        Ok(Attachment {
            uuid: uuid::Uuid::new_v4(),
            part_id: Some(format!("part-{n}")),
            name: metadata.name.clone(),
            mime_type: metadata.mime_type.clone(),
            size: data.len() as u64,
            disposition: metadata.disposition,
            content_id: None,
            local_path: None,
        })
    }
}

/// Authorization codes are `user-{id}`.
#[derive(Default)]
pub struct FakeAuthenticator {
    pub reject_refresh: AtomicBool,
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn exchange_code(&self, code: &str, _code_verifier: &str) -> mailroom_oauth::Result<Token> {
        let user_id = code
            .strip_prefix("user-")
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| mailroom_oauth::Error::oauth_error("invalid_grant", "bad code"))?;
        Ok(token_for(user_id))
    }

    async fn refresh(&self, token: &Token) -> mailroom_oauth::Result<Token> {
        if self.reject_refresh.load(Ordering::SeqCst) {
            return Err(mailroom_oauth::Error::oauth_error("invalid_grant", "revoked"));
        }
        Ok(token_for(token.user_id))
    }
}

/// Everything an account manager test needs.
pub struct Harness {
    pub manager: Arc<AccountManager>,
    pub api: Arc<FakeApi>,
    pub authenticator: Arc<FakeAuthenticator>,
    pub tokens: Arc<MemoryTokenStore>,
    pub push: Arc<LocalPushRegistry>,
    pub device_contacts: Arc<InMemoryContactSource>,
}

impl Harness {
    pub async fn new(config: CoreConfig) -> Self {
        let api = FakeApi::new();
        let authenticator = Arc::new(FakeAuthenticator::default());
        let tokens = Arc::new(MemoryTokenStore::new());
        let push = Arc::new(LocalPushRegistry::new());
        let device_contacts = Arc::new(InMemoryContactSource::default());

        let collaborators = Collaborators {
            token_store: tokens.clone(),
            authenticator: authenticator.clone(),
            api: api.clone(),
            push: push.clone(),
            device_contacts: device_contacts.clone(),
        };
        let manager = AccountManager::new(config, collaborators).await.unwrap();

        Self {
            manager,
            api,
            authenticator,
            tokens,
            push,
            device_contacts,
        }
    }

    pub async fn in_memory() -> Self {
        Self::new(CoreConfig::in_memory()).await
    }

    /// Logs in user `user_id` owning `mailboxes`.
    pub async fn login(&self, user_id: i64, mailboxes: Vec<Mailbox>) {
        self.api.set_mailboxes(user_id, mailboxes);
        self.manager
            .create_and_set_current_account(&format!("user-{user_id}"), "verifier")
            .await
            .unwrap();
    }
}

/// A fetcher for `user_id` outside of any account manager.
pub fn standalone_fetcher(user_id: i64, api: Arc<FakeApi>) -> Arc<ApiFetcher> {
    Arc::new(ApiFetcher::new(
        token_for(user_id),
        api,
        Arc::new(FakeAuthenticator::default()),
    ))
}

/// Device source that cancels a merge of `target` while it is being enumerated.
pub struct CancellingSource {
    pub inner: InMemoryContactSource,
    pub target: Mutex<Option<Arc<mailroom_core::ContactManager>>>,
}

impl DeviceContactSource for CancellingSource {
    fn enumerate_contacts(
        &self,
        visitor: &mut dyn FnMut(mailroom_core::LocalContact, &mut bool),
    ) -> mailroom_core::Result<()> {
        if let Some(manager) = self.target.lock().unwrap().as_ref() {
            manager.cancel_contact_merge();
        }
        self.inner.enumerate_contacts(visitor)
    }
}
