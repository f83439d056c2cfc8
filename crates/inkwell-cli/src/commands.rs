//! Command parsing and execution.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, Subcommand};
use inkwell_core::auth::now_millis;
use inquire::{Password, PasswordDisplayMode};
use inkwell_core::{ApiClient, Config, Session, SessionManager};
use tracing::{info, warn};

/// Environment variable checked before prompting for a password
const PASSWORD_ENV: &str = "INKWELL_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "inkwell")]
#[command(about = "Sign in to the Inkwell backend and keep the session fresh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run; `status` when none was given
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show the stored session
    Status,
    /// Sign in (password from prompt or INKWELL_PASSWORD). The email
    /// defaults to the last one that signed in successfully.
    Login {
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        username: String,
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        email: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Exchange the refresh token for a new token pair
    Refresh,
    /// Print the Google sign-in URL
    GoogleUrl,
    /// Finish Google sign-in with an authorization code
    GoogleCallback {
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        code: String,
    },
    /// Keep the session fresh until Ctrl+C
    Watch,
}

fn read_password(confirm: bool) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let prompt = Password::new("Password:").with_display_mode(PasswordDisplayMode::Masked);
    let prompt = if confirm { prompt } else { prompt.without_confirmation() };
    prompt.prompt().context("Failed to read password")
}

fn describe(session: &Session) -> String {
    describe_at(session, now_millis())
}

fn describe_at(session: &Session, now: i64) -> String {
    let Some(user) = session.user() else {
        return "Signed out".to_string();
    };
    if session.refresh_token_expired(now) {
        return format!(
            "Signed in as {} <{}> (refresh token expired, sign in again)",
            user.display_name(),
            user.email
        );
    }
    let expiry = match session.minutes_until_expiry(now) {
        Some(0) => "access token expired".to_string(),
        Some(m) => format!("access token valid for {}m", m),
        None => "access token expiry unknown".to_string(),
    };
    format!("Signed in as {} <{}> ({}, {})", user.display_name(), user.email, user.role, expiry)
}

/// Run a command. Returns whether the operation succeeded.
pub async fn run(command: Command, mut config: Config) -> Result<bool> {
    let backend = Arc::new(ApiClient::new(config.api_base_url.clone())?);
    let store = config.open_store()?;
    let manager = SessionManager::new(backend, store, config.manager_config());
    let session = manager.initialize().await;

    let ok = match command {
        Command::Status => {
            println!("{}", describe(&session));
            if let Some(at) = manager.scheduled_refresh_at() {
                let minutes = ((at - now_millis()) / 60_000).max(0);
                println!("Next refresh in {}m", minutes);
            }
            true
        }
        Command::Login { email } => {
            let Some(email) = login_email(email, &config) else {
                eprintln!("No email given and none remembered; run `inkwell login <email>`");
                return Ok(false);
            };
            println!("Signing in as {}", email);
            let password = read_password(false)?;
            match manager.login(&email, &password).await {
                Ok(user) => {
                    println!("Signed in as {}", user.display_name());
                    remember_email(&mut config, &email);
                    true
                }
                Err(e) => {
                    eprintln!("Login failed: {}", e);
                    false
                }
            }
        }
        Command::Register { username, email } => {
            let password = read_password(true)?;
            match manager.register(&username, &email, &password).await {
                Ok(user) => {
                    println!("Registered and signed in as {}", user.display_name());
                    remember_email(&mut config, &email);
                    true
                }
                Err(e) => {
                    eprintln!("Registration failed: {}", e);
                    false
                }
            }
        }
        Command::Logout => {
            manager.logout().await;
            println!("Signed out");
            true
        }
        Command::Refresh => match manager.refresh_token_if_needed().await {
            Ok(()) => {
                println!("{}", describe(&manager.session()));
                true
            }
            Err(e) => {
                eprintln!("Refresh failed: {}", e);
                false
            }
        },
        Command::GoogleUrl => match manager.auth_url().await {
            Ok(url) => {
                println!("{}", url);
                true
            }
            Err(e) => {
                eprintln!("Could not get sign-in URL: {}", e);
                false
            }
        },
        Command::GoogleCallback { code } => match manager.handle_google_callback(&code).await {
            Ok(user) => {
                println!("Signed in as {}", user.display_name());
                true
            }
            Err(e) => {
                eprintln!("Google sign-in failed: {}", e);
                false
            }
        },
        Command::Watch => watch(&manager).await?,
    };

    Ok(ok)
}

/// The email to sign in with: the one given, else the last one remembered
fn login_email(given: Option<String>, config: &Config) -> Option<String> {
    given.or_else(|| config.last_email.clone().filter(|e| !e.trim().is_empty()))
}

fn remember_email(config: &mut Config, email: &str) {
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

/// Print every session change until Ctrl+C or sign-out
async fn watch(manager: &SessionManager) -> Result<bool> {
    if !manager.is_authenticated() {
        eprintln!("Not signed in");
        return Ok(false);
    }

    let mut rx = manager.subscribe();
    println!("{}", describe(&rx.borrow_and_update()));
    info!("Watching session");

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
                let session = rx.borrow_and_update().clone();
                println!("{}", describe(&session));
                if !session.is_authenticated() {
                    return Ok(false);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                return Ok(true);
            }
        }
    }
}
