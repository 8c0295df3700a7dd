//! tenantdesk - a terminal admin console for multi-tenant SaaS organizations.
//!
//! Every tenant command runs against the current session, whose OAuth token
//! is refreshed lazily before it expires.

mod cli;
mod console;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tenantdesk_core::auth::AuthError;
use tenantdesk_core::config::Config;
use tenantdesk_core::ServiceError;

use cli::{Cli, Command};
use console::Console;

/// Exit status when the session must log in again
const EXIT_LOGIN_REQUIRED: u8 = 2;

/// Initialize the tracing subscriber for logging.
///
/// Console output goes to stderr, filtered by RUST_LOG (default "warn").
/// A daily log file in the cache directory records everything at debug.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = Config::default()
        .cache_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("./logs"));
    let file_writer = std::fs::create_dir_all(&log_dir).ok().map(|_| {
        tracing_appender::non_blocking(tracing_appender::rolling::daily(
            log_dir,
            "tenantdesk.log",
        ))
    });

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(filter);

    match file_writer {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer)
                        .with_filter(EnvFilter::new("tenantdesk=debug,tenantdesk_core=debug")),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    }
}

/// Whether any error in the chain means the user has to log in again
fn requires_login(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ServiceError>()
            .is_some_and(ServiceError::requires_login)
            || matches!(cause.downcast_ref::<AuthError>(), Some(AuthError::AuthRequired))
    })
}

async fn run(command: Command) -> anyhow::Result<()> {
    let mut console = Console::new()?;

    match command {
        Command::Login { username } => console.login(username).await,
        Command::Logout => console.logout().await,
        Command::Status { json } => console.status(json).await,
        Command::Refresh => console.refresh().await,
        Command::List { search, json } => console.list(search.as_deref(), json).await,
        Command::Show { ids } => console.show(&ids).await,
        Command::Create {
            fields,
            primary_admin_email,
            primary_admin_first_name,
            primary_admin_last_name,
        } => {
            console
                .create(
                    fields,
                    primary_admin_email,
                    primary_admin_first_name,
                    primary_admin_last_name,
                )
                .await
        }
        Command::Update { id, fields } => console.update(&id, fields).await,
        Command::Delete { ids, yes } => console.delete(&ids, yes).await,
        Command::Export { output } => console.export(output).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!(command = ?cli.command, "tenantdesk starting");

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if requires_login(&e) => {
            eprintln!("Session expired. Please log in again.");
            ExitCode::from(EXIT_LOGIN_REQUIRED)
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
