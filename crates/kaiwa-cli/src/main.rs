//! Kaiwa CLI - command-line client for the Kaiwa chat service.

use anyhow::{bail, Result};
use auth_engine::{ProviderConfig, SessionManager};
use clap::{Parser, Subcommand};
use client_config_and_utils::{init_logging, Config, Paths};
use client_storage::{CredentialStore, FileStorage};
use gateway_client::ApiClient;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Kaiwa command-line interface.
#[derive(Parser)]
#[command(name = "kaiwa")]
#[command(about = "Chat with Kaiwa from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory for runtime files (config, credentials). Defaults to ~/.kaiwa
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account
    Signup {
        /// Email address (prompted if omitted)
        email: Option<String>,
    },
    /// Confirm a registration with the emailed code
    Confirm {
        /// Email address
        email: String,
        /// Confirmation code
        code: String,
    },
    /// Sign in
    Login {
        /// Email address (prompted if omitted)
        email: Option<String>,
    },
    /// Sign out and clear local session state
    Logout,
    /// Show the current session status
    Status,
    /// Refresh the session tokens
    Refresh,
    /// Send a chat message
    Chat {
        /// The message to send
        message: String,
    },
    /// Start a fresh chat session
    NewSession,
    /// Show chat history
    History,
    /// Show the stored profile
    Profile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    init_logging(&config.log_level);
    tracing::debug!(base_dir = %paths.base_dir().display(), "configuration loaded");

    let storage = FileStorage::open(paths.storage_file())?;
    let store = Arc::new(CredentialStore::new(Box::new(storage)));

    let session = SessionManager::new(
        ProviderConfig {
            region: config.region.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            user_pool_id: config.user_pool_id.clone(),
            endpoint: config.provider_endpoint.clone(),
        },
        store.clone(),
    );

    let api = ApiClient::new(config.api_base_url.clone(), store.clone());
    api.set_unauthorized_hook(Box::new(|| {
        eprintln!("Your session has expired. Please run `kaiwa login` again.");
    }));

    match cli.command {
        Commands::Signup { email } => {
            let email = email_or_prompt(email)?;
            let password = rpassword::prompt_password("Password: ")?;
            let display_name = prompt_optional("Display name (optional): ")?;

            let mut attributes = vec![("email".to_string(), email.clone())];
            if let Some(name) = display_name {
                attributes.push(("name".to_string(), name));
            }

            let outcome = session.sign_up(&email, &password, &attributes).await?;
            println!("Account created (sub: {}).", outcome.user_sub);
            match outcome.code_delivery.and_then(|d| d.destination) {
                Some(destination) => {
                    println!("A confirmation code was sent to {destination}.")
                }
                None => println!("A confirmation code was sent."),
            }
            println!("Finish with: kaiwa confirm {email} <code>");
        }
        Commands::Confirm { email, code } => {
            session.confirm_sign_up(&email, &code).await?;
            println!("Account confirmed. Sign in with: kaiwa login {email}");
        }
        Commands::Login { email } => {
            let email = email_or_prompt(email)?;
            let password = rpassword::prompt_password("Password: ")?;

            session.sign_in(&email, &password).await?;
            let user = session.current_user();
            let who = user
                .as_ref()
                .and_then(|u| u.email.as_deref())
                .unwrap_or(&email);
            println!("Logged in as {who}.");
        }
        Commands::Logout => {
            session.sign_out().await?;
            println!("Logged out.");
        }
        Commands::Status => {
            session.restore_session()?;
            match session.current_user() {
                Some(user) if session.is_authenticated() => {
                    println!("Logged in as {}", user.email.as_deref().unwrap_or("unknown"));
                    println!("  subject: {}", user.sub.as_deref().unwrap_or("unknown"));
                    println!("  token expires at epoch {}", user.exp);
                }
                _ => println!("Not logged in."),
            }
        }
        Commands::Refresh => {
            require_session(&session)?;
            session.refresh_tokens().await?;
            println!("Tokens refreshed.");
        }
        Commands::Chat { message } => {
            require_session(&session)?;
            let reply = api.send_message(&message).await?;
            println!("{}", reply.response);
        }
        Commands::NewSession => {
            let session_id = api.new_session()?;
            println!("Started new chat session {session_id}.");
        }
        Commands::History => {
            require_session(&session)?;
            let history = api.history().await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Commands::Profile => {
            require_session(&session)?;
            let profile = api.get_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}

/// Restore the persisted session and insist on a live token.
fn require_session(session: &SessionManager) -> Result<()> {
    session.restore_session()?;
    if !session.is_authenticated() {
        bail!("Not logged in. Run `kaiwa login` first.");
    }
    Ok(())
}

fn email_or_prompt(email: Option<String>) -> Result<String> {
    if let Some(email) = email {
        return Ok(email);
    }

    print!("Email: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let email = input.trim().to_string();

    if email.is_empty() {
        bail!("Email is required");
    }
    Ok(email)
}

fn prompt_optional(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let value = input.trim().to_string();

    Ok(if value.is_empty() { None } else { Some(value) })
}
