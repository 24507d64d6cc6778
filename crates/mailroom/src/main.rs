//! `mailroom` - command-line front end of the synchronization core.
//!
//! Logs in through OAuth, keeps tokens in the system keyring and drives the
//! account, contact and attachment managers of `mailroom-core`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mailroom_core::{
    AccountManager, AttachmentSource, AttachmentsManagerWorker, Collaborators, CoreConfig,
    FileAttachmentResolver, HttpMailApi, InMemoryContactSource, KeyringTokenStore,
    LocalPushRegistry, UserId,
};
use mailroom_oauth::{OAuthClient, Provider};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, LoginConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailroom=info,mailroom_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = oauth_client(&cli.login)?;

    if matches!(cli.command, Command::LoginUrl) {
        print_login_url(&client);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => CoreConfig::load(path).await,
        None => CoreConfig::load_default().await,
    }
    .context("Failed to load configuration")?;

    let api = match &cli.login.api_url {
        Some(url) => HttpMailApi::new(url),
        None => HttpMailApi::infomaniak(),
    }
    .context("Invalid API URL")?;

    let collaborators = Collaborators {
        token_store: Arc::new(KeyringTokenStore::default()),
        authenticator: Arc::new(client),
        api: Arc::new(api),
        push: Arc::new(LocalPushRegistry::new()),
        device_contacts: Arc::new(InMemoryContactSource::default()),
    };
    let manager = AccountManager::new(config, collaborators)
        .await
        .context("Failed to open the account stores")?;

    run(&manager, cli.command).await
}

async fn run(manager: &Arc<AccountManager>, command: Command) -> Result<()> {
    match command {
        // Needs no store; answered in `main`.
        Command::LoginUrl => {}
        Command::Login { code, verifier } => {
            let account = manager
                .create_and_set_current_account(&code, &verifier)
                .await
                .context("Login failed")?;
            println!("Logged in as {}", account.display_name());
        }
        Command::Accounts => list_accounts(manager).await?,
        Command::Refresh => {
            let refreshed = manager.refresh_all_accounts().await;
            info!("Refreshed {refreshed} account(s)");
            if let Some(account) = manager.current_account().await
                && let Some(contacts) = manager.get_contact_manager(account.user_id)
                && let Err(e) = contacts.refresh_contacts_and_address_books().await
            {
                warn!("Contact refresh failed: {e}");
            }
        }
        Command::Switch { user_id } => {
            manager.switch_account(UserId::new(user_id)).await?;
            list_accounts(manager).await?;
        }
        Command::Logout { user_id } => {
            manager.remove_account_for(UserId::new(user_id)).await?;
            println!("Logged out {user_id}");
        }
        Command::Contacts { query, limit } => {
            let account = manager
                .current_account()
                .await
                .context("No account is selected")?;
            let contacts = manager
                .get_contact_manager(account.user_id)
                .context("The current account has no token")?;
            contacts.refresh_contacts_and_address_books_if_needed().await?;
            for contact in contacts.search_contacts(&query, limit, None).await? {
                println!("{} <{}>", contact.name, contact.email);
            }
        }
        Command::Attach { files, subject } => attach(manager, files, subject).await?,
    }
    Ok(())
}

fn oauth_client(login: &LoginConfig) -> Result<OAuthClient> {
    let provider = match (&login.auth_url, &login.token_url) {
        (Some(auth_url), Some(token_url)) => Provider::new("custom", auth_url, token_url),
        _ => Provider::infomaniak(),
    }
    .context("Invalid login service")?;
    Ok(OAuthClient::new(&login.client_id, provider).with_redirect_uri(&login.redirect_uri))
}

fn print_login_url(client: &OAuthClient) {
    let login = client.start_login();
    println!("Open: {}", login.url());
    println!("Verifier: {}", login.verifier());
}

async fn list_accounts(manager: &AccountManager) -> Result<()> {
    let selection = manager.selection().await;
    for account in manager.accounts().await {
        let current = selection.user_id == Some(account.user_id);
        println!(
            "{} {} ({})",
            if current { "*" } else { " " },
            account.display_name(),
            account.user_id
        );
        for mailbox in manager.mailboxes(account.user_id).await? {
            let marker = if current && mailbox.mailbox_id == selection.mailbox_id {
                ">"
            } else {
                " "
            };
            let state = if mailbox.is_available() { "" } else { " [unavailable]" };
            println!("    {marker} {}{state}", mailbox.email);
        }
    }
    Ok(())
}

async fn attach(
    manager: &AccountManager,
    files: Vec<std::path::PathBuf>,
    subject: Option<String>,
) -> Result<()> {
    let Some(mailbox_manager) = manager.switch_to_first_valid_mailbox_manager().await? else {
        bail!("No usable mailbox");
    };
    let draft = mailbox_manager.create_draft().await?;
    if let Some(subject) = subject {
        mailbox_manager
            .set_draft_subject(draft.local_uuid, &subject)
            .await?;
    }

    let worker = AttachmentsManagerWorker::new(
        manager.config(),
        mailbox_manager,
        draft.local_uuid,
        Arc::new(FileAttachmentResolver::in_temp_dir()),
    );
    let outcome = worker
        .import_attachments(files.into_iter().map(AttachmentSource::File).collect())
        .await?;

    for attachment in &outcome.imported {
        let state = if attachment.is_uploaded() { "uploaded" } else { "local" };
        println!("{} ({} bytes, {state})", attachment.name, attachment.size);
    }
    for error in &outcome.errors {
        warn!("{error}");
    }
    println!("Draft {}", draft.local_uuid);
    Ok(())
}
