//! deskship CLI entry point
//!
//! Parses arguments, installs the log subscriber, runs the command and prints
//! failures with context and suggestions.

use clap::Parser;
use deskship::cli;
use deskship::core::user_friendly_error;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over the verbosity flags
    let default_level = cli.build_config().log_level.unwrap_or_else(|| "info".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            user_friendly_error(e).display();
            ExitCode::FAILURE
        }
    }
}
