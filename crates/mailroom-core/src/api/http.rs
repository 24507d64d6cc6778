//! HTTP implementation of [`MailApi`].
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "result": "success", "data": { ... } }
//! { "result": "error", "error": { "code": "...", "description": "..." } }
//! ```

use async_trait::async_trait;
use mailroom_oauth::Token;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::client::{MailApi, ProgressCallback};
use super::error::{ApiError, ApiResult};
use crate::account::UserProfile;
use crate::attachments::Attachment;
use crate::contacts::{AddressBook, NewContact, RemoteContact};
use crate::mailbox::{ExternalMailInfo, Folder, Mailbox, MailboxId, MailboxPermissions, Quotas};

/// Base URL of the Infomaniak mail API.
const INFOMANIAK_API_URL: &str = "https://mail.infomaniak.com/api/";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: String,
    data: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct AddedMailbox {
    mailbox_id: i64,
}

#[derive(Debug, Deserialize)]
struct AddedContact {
    id: serde_json::Value,
}

/// JSON client for the remote mail API.
#[derive(Debug, Clone)]
pub struct HttpMailApi {
    client: Client,
    base_url: Url,
}

impl HttpMailApi {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// Create a client for the Infomaniak API.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in URL fails to parse.
    pub fn infomaniak() -> ApiResult<Self> {
        Self::new(INFOMANIAK_API_URL)
    }

    fn request(&self, method: Method, path: &str, token: &Token) -> ApiResult<RequestBuilder> {
        let url = self.base_url.join(path)?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, token.authorization_header()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let body = response.bytes().await?;
        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(ApiError::Status(status.as_u16())),
            Err(e) => return Err(e.into()),
        };

        if envelope.result != "success" || !status.is_success() {
            return Err(envelope.error.map_or(ApiError::Status(status.as_u16()), |error| {
                ApiError::Server {
                    code: error.code,
                    description: error.description,
                }
            }));
        }

        envelope.data.ok_or_else(|| ApiError::Server {
            code: "missing_data".into(),
            description: "Response has no data".into(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &Token) -> ApiResult<T> {
        debug!("GET {path}");
        self.send(self.request(Method::GET, path, token)?).await
    }
}

fn mailbox_path(mailbox: &Mailbox, endpoint: &str) -> String {
    format!(
        "mail_hostings/{}/mailboxes/{}/{endpoint}",
        mailbox.hosting_id, mailbox.local_part
    )
}

#[async_trait]
impl MailApi for HttpMailApi {
    async fn user_profile(&self, token: &Token) -> ApiResult<UserProfile> {
        self.get("profile", token).await
    }

    async fn mailboxes(&self, token: &Token) -> ApiResult<Vec<Mailbox>> {
        let user_id = crate::account::UserId::new(token.user_id);
        let mut mailboxes: Vec<Mailbox> = self.get("mailbox", token).await?;
        for mailbox in &mut mailboxes {
            mailbox.user_id = user_id;
        }
        Ok(mailboxes)
    }

    async fn permissions(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<MailboxPermissions> {
        self.get(&mailbox_path(mailbox, "permissions"), token).await
    }

    async fn external_mail_flag(
        &self,
        token: &Token,
        mailbox: &Mailbox,
    ) -> ApiResult<ExternalMailInfo> {
        self.get(&mailbox_path(mailbox, "external_mail_flag"), token)
            .await
    }

    async fn quotas(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<Quotas> {
        let path = format!(
            "mailbox/quotas?mailbox={}&product_id={}",
            mailbox.local_part, mailbox.hosting_id
        );
        self.get(&path, token).await
    }

    async fn folders(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<Vec<Folder>> {
        self.get(&format!("mail/{}/folder", mailbox.uuid), token).await
    }

    async fn address_books(&self, token: &Token) -> ApiResult<Vec<AddressBook>> {
        self.get("pim/addressbook", token).await
    }

    async fn contacts(&self, token: &Token) -> ApiResult<Vec<RemoteContact>> {
        self.get("pim/contact/all?filters=has_email", token).await
    }

    async fn add_contact(
        &self,
        token: &Token,
        contact: &NewContact,
        address_book_id: i64,
    ) -> ApiResult<String> {
        let request = self.request(Method::POST, "pim/contact", token)?.json(&json!({
            "addressbookId": address_book_id,
            "name": contact.name,
            "emails": [{ "value": contact.email }],
        }));
        let added: AddedContact = self.send(request).await?;
        Ok(match added.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        })
    }

    async fn add_mailbox(&self, token: &Token, mail: &str, password: &str) -> ApiResult<MailboxId> {
        let request = self.request(Method::POST, "mailbox", token)?.json(&json!({
            "mail": mail,
            "password": password,
            "is_primary": false,
        }));
        let added: AddedMailbox = self.send(request).await?;
        Ok(MailboxId::new(added.mailbox_id))
    }

    async fn detach_mailbox(&self, token: &Token, mailbox: &Mailbox) -> ApiResult<()> {
        let path = format!("mailbox/{}", mailbox.mailbox_id);
        let _: bool = self
            .send(self.request(Method::DELETE, &path, token)?)
            .await?;
        Ok(())
    }

    async fn create_attachment(
        &self,
        token: &Token,
        mailbox: &Mailbox,
        data: Vec<u8>,
        metadata: &Attachment,
        progress: ProgressCallback,
    ) -> ApiResult<Attachment> {
        let disposition = match metadata.disposition {
            crate::attachments::AttachmentDisposition::Attachment => "attachment",
            crate::attachments::AttachmentDisposition::Inline => "inline",
        };
        let request = self
            .request(
                Method::POST,
                &format!("mail/{}/draft/attachment", mailbox.uuid),
                token,
            )?
            .query(&[
                ("name", metadata.name.as_str()),
                ("mime_type", metadata.mime_type.as_str()),
                ("disposition", disposition),
            ])
            .header(reqwest::header::CONTENT_TYPE, metadata.mime_type.as_str())
            .body(data);

        progress(0.0);
        let attachment = self.send(request).await?;
        progress(1.0);
        Ok(attachment)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let api = HttpMailApi::new("https://example.com/api").unwrap();
        assert_eq!(
            api.base_url.join("mailbox").unwrap().as_str(),
            "https://example.com/api/mailbox"
        );
    }

    #[test]
    fn test_envelope_parsing() {
        let ok: Envelope<Vec<i64>> =
            serde_json::from_str(r#"{"result":"success","data":[1,2]}"#).unwrap();
        assert_eq!(ok.data, Some(vec![1, 2]));

        let err: Envelope<Vec<i64>> = serde_json::from_str(
            r#"{"result":"error","error":{"code":"not_found","description":"Nope"}}"#,
        )
        .unwrap();
        assert!(err.data.is_none());
        assert_eq!(err.error.unwrap().code, "not_found");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(HttpMailApi::new("not a url"), Err(ApiError::Url(_))));
    }
}
