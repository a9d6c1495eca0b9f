//! scraplook - command-line client for the scraplook mail backend.
//!
//! Signs in, keeps the session's access token fresh in the background, and
//! lists users and messages.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scraplook_core::{ApiClient, ApiError, Config, Decision, RouteGuard, SessionStore, TokenRefreshWatcher};

#[derive(Parser)]
#[command(name = "scraplook", version, about = "Client for the scraplook mail backend")]
struct Cli {
    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored
    Status,
    /// Show the signed-in user
    Me,
    /// List users
    Users,
    /// List messages of an email address
    Messages {
        /// Email address ID
        email_id: String,
        /// Show sent messages instead of received ones
        #[arg(long)]
        sent: bool,
    },
    /// Keep the access token fresh until interrupted
    Watch,
}

impl Command {
    /// Destination the route guard checks before running the command
    fn destination(&self) -> &'static str {
        match self {
            Command::Login { .. } | Command::Logout | Command::Status => "/login",
            Command::Me => "/me",
            Command::Users => "/users",
            Command::Messages { .. } => "/messages",
            Command::Watch => "/watch",
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.backend_url.clone() {
        config.backend_url = url;
    }

    // Rehydrate before any request is authenticated
    let session = Arc::new(SessionStore::rehydrate(config.open_storage()?));
    let api = ApiClient::new(&config.backend_url, Arc::clone(&session))
        .context("Failed to create API client")?;

    let guard = RouteGuard::default();
    if let Decision::RedirectTo(path) = guard.guard_session(cli.command.destination(), &session) {
        anyhow::bail!("Not signed in (redirected to {}). Run `scraplook login` first.", path);
    }

    let result = run(cli.command, &mut config, &api).await;
    if let Err(ref e) = result {
        if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized) {
            warn!("Backend rejected the session");
            eprintln!("Session expired. Run `scraplook login` again.");
        }
    }
    result
}

async fn run(command: Command, config: &mut Config, api: &ApiClient) -> Result<()> {
    match command {
        Command::Login { username } => login(username, config, api).await,
        Command::Logout => {
            api.sign_out();
            println!("Signed out.");
            Ok(())
        }
        Command::Status => {
            let session = api.session();
            if session.is_authenticated() {
                println!("Signed in as {} on {}", display_name(&session.user_name()), api.base_url());
            } else {
                println!("Not signed in.");
            }
            Ok(())
        }
        Command::Me => {
            refresh_before_request(api).await;
            let profile = api.current_user().await?;
            println!("{} ({})", profile.user.name, profile.user.id);
            Ok(())
        }
        Command::Users => {
            refresh_before_request(api).await;
            for user in api.fetch_users().await? {
                println!("{}\t{}", user.id, user.name);
            }
            Ok(())
        }
        Command::Messages { email_id, sent } => {
            refresh_before_request(api).await;
            let messages = if sent {
                api.fetch_sent_messages(&email_id).await?
            } else {
                api.fetch_received_messages(&email_id).await?
            };
            for message in messages {
                println!(
                    "{}\t{}\t{}",
                    message.id,
                    message.sender_display(),
                    message.subject_display()
                );
            }
            Ok(())
        }
        Command::Watch => watch(config, api).await,
    }
}

async fn login(username: Option<String>, config: &mut Config, api: &ApiClient) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;

    api.sign_in(&username, &password).await?;

    config.last_username = Some(username.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Signed in as {}.", username);
    Ok(())
}

/// One refresh tick before a one-off request. A failure is logged and the
/// request goes out with the stored token.
async fn refresh_before_request(api: &ApiClient) {
    match api.refresh_session().await {
        Ok(outcome) => debug!(?outcome, "Checked access token before request"),
        Err(e) => warn!(error = %e, "Access token check failed, sending request anyway"),
    }
}

async fn watch(config: &Config, api: &ApiClient) -> Result<()> {
    let mut watcher = TokenRefreshWatcher::new(
        Arc::clone(api.session()),
        Arc::new(api.clone()),
        config.token_check_interval(),
    );
    watcher.start();
    info!(backend = api.base_url(), "Watching access token, press Ctrl+C to stop");
    eprintln!("Keeping the session fresh. Press Ctrl+C to stop.");

    let result = tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C");
    watcher.stop();
    result
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("Username is required");
    }
    Ok(value)
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "(unknown user)"
    } else {
        name
    }
}
