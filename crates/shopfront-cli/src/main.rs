//! Shopfront CLI - command line access to the storefront and back office API.
//!
//! Logs in once, keeps the session fresh across runs, and issues
//! authenticated calls through the same pipeline the apps use.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use shopfront_core::{ApiRequest, Config, SessionContext};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application name used for the log directory
const APP_NAME: &str = "shopfront";

/// Log file name prefix; the appender adds the date
const LOG_FILE: &str = "shopfront.log";

const USERNAME_ENV: &str = "SHOPFRONT_USERNAME";
const PASSWORD_ENV: &str = "SHOPFRONT_PASSWORD";

#[derive(Parser)]
#[command(name = "shopfront", version, about = "Storefront and back office API client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// End the session and remove stored credentials
    Logout,
    /// Restore the session and print the current user
    Whoami,
    /// Show the locally stored session state without contacting the backend
    Status,
    /// Issue an API call through the authenticated pipeline
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,
        /// Path relative to the API base URL, e.g. `orders/`
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Fall back to an anonymous call if the session cannot be refreshed
        #[arg(long)]
        anonymous_fallback: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Terminal output follows `RUST_LOG` (default `warn`); the log file
/// captures debug output from the client library.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(filter);

    let log_dir = dirs::cache_dir().map(|d| d.join(APP_NAME).join("logs"));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("shopfront_core=debug,shopfront=debug"));
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    let context = SessionContext::from_config(&config)?;

    match cli.command {
        Command::Login { username } => login(&context, &mut config, username).await,
        Command::Logout => {
            context.logout();
            println!("Logged out");
            Ok(())
        }
        Command::Whoami => whoami(&context).await,
        Command::Status => {
            status(&context);
            Ok(())
        }
        Command::Request {
            method,
            path,
            data,
            anonymous_fallback,
        } => request(&context, &method, &path, data.as_deref(), anonymous_fallback).await,
    }
}

async fn login(context: &SessionContext, config: &mut Config, username: Option<String>) -> Result<()> {
    // Get credentials from args, env vars or config
    let username = match username
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .or_else(|| config.last_username.clone())
    {
        Some(name) => name,
        None => prompt("Username: ")?,
    };

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let profile = context
        .try_login(&username, &password)
        .await
        .context("Login failed")?;

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    info!(username = %profile.username, "Login complete");
    let role = if profile.is_privileged { " (staff)" } else { "" };
    println!("Logged in as {}{}", profile.username, role);
    Ok(())
}

async fn whoami(context: &SessionContext) -> Result<()> {
    if !context.initialize().await {
        bail!("Not logged in. Run `shopfront login` first.");
    }
    let profile = context
        .current_profile()
        .context("Session restored without a user profile")?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn status(context: &SessionContext) {
    let session = context.session();
    let creds = session.credentials();
    println!("state:         {:?}", session.state());
    println!("access token:  {}", if creds.access_token.is_some() { "stored" } else { "absent" });
    println!("refresh token: {}", if creds.refresh_token.is_some() { "stored" } else { "absent" });
    match creds.user {
        Some(user) => println!("user:          {} (id {})", user.username, user.id),
        None => println!("user:          absent"),
    }
}

async fn request(
    context: &SessionContext,
    method: &str,
    path: &str,
    data: Option<&str>,
    anonymous_fallback: bool,
) -> Result<()> {
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let mut req = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(data).context("Request body is not valid JSON")?;
        req = req.json(&body)?;
    }
    if anonymous_fallback {
        req = req.allow_anonymous();
    }

    let response = context.api().execute(&req).await?;
    let text = response.text().await.context("Failed to read response body")?;

    // Pretty print JSON, pass anything else through
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => {}
        Err(_) => println!("{}", text),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No username given");
    }
    Ok(value)
}
