//! Collaborator traits of the remote side.

use std::sync::Arc;

use async_trait::async_trait;
use mailroom_oauth::{OAuthClient, Token};

use super::error::ApiResult;
use crate::account::UserProfile;
use crate::attachments::Attachment;
use crate::contacts::{AddressBook, NewContact, RemoteContact};
use crate::mailbox::{ExternalMailInfo, Folder, Mailbox, MailboxId, MailboxPermissions, Quotas};

/// Upload progress in `0.0..=1.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Remote mail API. Every call is authenticated with `token`.
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Profile of the token owner.
    async fn user_profile(&self, token: &Token) -> ApiResult<UserProfile>;

    /// Mailboxes of the token owner.
    async fn mailboxes(&self, token: &Token) -> ApiResult<Vec<Mailbox>>;

    /// Permissions of `mailbox`.
    async fn permissions(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<MailboxPermissions>;

    /// External-mail warning settings of `mailbox`.
    async fn external_mail_flag(&self, token: &Token, mailbox: &Mailbox)
    -> ApiResult<ExternalMailInfo>;

    /// Storage quotas of `mailbox`.
    async fn quotas(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<Quotas>;

    /// Folders of `mailbox`.
    async fn folders(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<Vec<Folder>>;

    /// Address books of the token owner.
    async fn address_books(&self, token: &Token) -> ApiResult<Vec<AddressBook>>;

    /// Contact directory of the token owner.
    async fn contacts(&self, token: &Token) -> ApiResult<Vec<RemoteContact>>;

    /// Creates a contact in `address_book_id`, returning its id.
    async fn add_contact(
        &self,
        token: &Token,
        contact: &NewContact,
        address_book_id: i64,
    ) -> ApiResult<String>;

    /// Attaches an existing mailbox to the token owner.
    async fn add_mailbox(&self, token: &Token, mail: &str, password: &str) -> ApiResult<MailboxId>;

    /// Detaches `mailbox` from the token owner.
    async fn detach_mailbox(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<()>;

    /// Uploads `data` as a draft attachment described by `metadata`.
    async fn create_attachment(
        &self,
        token: &Token,
        mailbox: &Mailbox,
        data: Vec<u8>,
        metadata: &Attachment,
        progress: ProgressCallback,
    ) -> ApiResult<Attachment>;
}

/// Obtains and refreshes tokens.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchanges an authorization code for a token.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> mailroom_oauth::Result<Token>;

    /// Refreshes `token`.
    async fn refresh(&self, token: &Token) -> mailroom_oauth::Result<Token>;
}

#[async_trait]
impl Authenticator for OAuthClient {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> mailroom_oauth::Result<Token> {
        Self::exchange_code(self, code, code_verifier).await
    }

    async fn refresh(&self, token: &Token) -> mailroom_oauth::Result<Token> {
        self.refresh_token(token).await
    }
}

/// Told about the outcome of token refreshes.
#[async_trait]
pub trait RefreshTokenDelegate: Send + Sync {
    /// A token was refreshed and must be persisted.
    async fn did_update_token(&self, token: &Token);

    /// `token` can no longer be refreshed.
    async fn did_fail_refresh_token(&self, token: &Token);
}
