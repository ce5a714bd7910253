//! wiremesh
//!
//! `wiremesh server` runs the coordinator, `wiremesh agent` keeps a host's
//! interfaces in sync with it, and `wiremesh token` mints bearer tokens for
//! both.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use wiremesh_observability::{init_logging, FileLoggingConfig, LogFormat, LogLevel, LoggingConfig};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LogLevel::Info,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    let format = cli.log_format.unwrap_or_else(|| {
        if std::io::stdout().is_terminal() {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    });
    let logging = LoggingConfig {
        level,
        format,
        file: cli.log_dir.clone().map(FileLoggingConfig::new),
        ..Default::default()
    };

    // Hold the guard for the life of the process so file logs are flushed
    let _guard = init_logging(&logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Token(action) => commands::token::handle_token(action),
        Commands::Server {
            bind,
            jwt_secret,
            db,
            reconcile_interval,
            sync_page_size,
        } => commands::build_runtime()?.block_on(commands::server::serve(
            bind,
            jwt_secret,
            db,
            reconcile_interval,
            sync_page_size,
        )),
        Commands::Agent {
            server,
            token,
            data_dir,
            sync_interval,
            request_timeout,
        } => commands::build_runtime()?.block_on(commands::agent::run_agent(
            server,
            token,
            data_dir,
            sync_interval,
            request_timeout,
        )),
    }
}
