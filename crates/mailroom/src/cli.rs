use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command-line options for mailroom.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub login: LoginConfig,

    #[command(subcommand)]
    pub command: Command,
}

/// Where and as whom to log in.
#[derive(Args, Debug)]
pub struct LoginConfig {
    /// OAuth client id registered for this application.
    #[arg(long, global = true, default_value = "mailroom-cli")]
    pub client_id: String,

    /// Redirect URI registered with the client id.
    #[arg(long, global = true, default_value = "http://localhost:8080/callback")]
    pub redirect_uri: String,

    /// Authorization endpoint of a custom login service.
    #[arg(long, global = true, requires = "token_url")]
    pub auth_url: Option<String>,

    /// Token endpoint of a custom login service.
    #[arg(long, global = true, requires = "auth_url")]
    pub token_url: Option<String>,

    /// Base URL of the mail API (defaults to Infomaniak).
    #[arg(long, global = true)]
    pub api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the URL to open in a browser, and the PKCE verifier to keep.
    LoginUrl,

    /// Exchange an authorization code and make the new account current.
    Login {
        /// Code received on the redirect URI.
        #[arg(long)]
        code: String,
        /// Verifier printed by `login-url`.
        #[arg(long)]
        verifier: String,
    },

    /// List accounts and their mailboxes.
    Accounts,

    /// Refresh every account, then the contacts of the current one.
    Refresh,

    /// Make another account current.
    Switch {
        /// User id of the account.
        user_id: i64,
    },

    /// Log out an account and delete its local data.
    Logout {
        /// User id of the account.
        user_id: i64,
    },

    /// Search the contacts of the current account.
    Contacts {
        /// Text to look for in names and emails.
        query: String,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Create a draft in the current mailbox and attach files to it.
    Attach {
        /// Files to attach.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Subject of the draft.
        #[arg(long)]
        subject: Option<String>,
    },
}
