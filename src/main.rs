//! nvmw command-line entry point.

use anyhow::Result;
use clap::Parser;
use nvmw_cli::cli;
use nvmw_cli::core::user_friendly_error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(code) => Ok(code),
        Err(e) => {
            // Convert to user-friendly error with context and suggestions
            user_friendly_error(e).display();
            Ok(ExitCode::FAILURE)
        }
    }
}
