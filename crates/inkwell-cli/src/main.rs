//! Inkwell CLI - sign in to the Inkwell backend and keep the session fresh.
//!
//! This binary drives the core `SessionManager` from the terminal. It is
//! the stand-in for the mobile app's screens: every command initializes
//! the manager from storage, runs one operation and exits.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Cli, Command};

/// Log file prefix for the `watch` command
const LOG_FILE_PREFIX: &str = "inkwell.log";

/// Initialize the tracing subscriber for logging.
///
/// When `log_dir` is given, logs are also written to a daily-rolling file
/// there. The returned guard must live until the process exits.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let command = match Cli::try_parse() {
        Ok(cli) => cli.into_command(),
        Err(e) => {
            use clap::error::ErrorKind;

            // Help and version go to stdout and exit 0; usage errors exit 2
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 2,
            };
            e.print().ok();
            std::process::exit(code);
        }
    };

    let config = inkwell_core::Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config ({}), using defaults", e);
        inkwell_core::Config::default()
    });

    let log_dir = match command {
        Command::Watch => config.cache_dir().ok(),
        _ => None,
    };
    if let Some(ref dir) = log_dir {
        std::fs::create_dir_all(dir)?;
    }
    let log_guard = init_tracing(log_dir.as_deref());
    info!(api = %config.api_base_url, store = ?config.store, "Inkwell CLI starting");

    let ok = commands::run(command, config).await?;
    // Flush the file log before a non-zero exit skips destructors.
    drop(log_guard);
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
