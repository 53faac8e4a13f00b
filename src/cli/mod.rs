//! Command-line interface for nvmw.
//!
//! # Command Structure
//!
//! - `upgrade` - Update nvmw in place (or just `--check` / `--status`)
//! - `check-for-updates` - What the hourly scheduled tasks run
//! - `schedule` - Register or remove the scheduled update checks
//! - `version` - Print the bare version string
//!
//! Two hidden commands are invoked by nvmw itself and are not meant to be
//! typed: `watch` runs the Watcher that swaps the executable after an upgrade,
//! and `cleanup-backup` is the command of the deferred backup cleanup task.
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging; `upgrade` also lists extracted files
//!   and self-tests the staged binary
//! - `--quiet` / `-q`: no log output and no spinner
//! - `--config` / `-c`: use a specific global config file
//! - `--no-progress`: no spinner
//!
//! # Exit Codes
//!
//! `0` on success, when already up to date, or when an upgrade was canceled;
//! `1` when an upgrade or the Watcher failed.

mod check;
mod cleanup;
mod schedule;
mod upgrade;
mod watch;

use crate::config::GlobalConfig;
use crate::logging;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

pub use upgrade::UpgradeCommand;
pub use watch::WatchCommand;

/// Settings resolved from the global flags, passed to every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Explicit log level (`debug` with `--verbose`); `None` defers to
    /// `RUST_LOG`.
    pub log_level: Option<String>,
    pub quiet: bool,
    pub verbose: bool,
    /// Disable the spinner.
    pub no_progress: bool,
    /// Global config file from `--config`.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the global config named by `--config`, or the default one.
    pub async fn load_global(&self) -> Result<GlobalConfig> {
        GlobalConfig::load_with_optional(self.config_path.clone()).await
    }

    /// Whether the console spinner should be drawn.
    #[must_use]
    pub const fn show_progress(&self) -> bool {
        !self.no_progress && !self.quiet
    }
}

/// Main CLI structure for nvmw.
#[derive(Parser)]
#[command(
    name = "nvmw",
    about = "NVM for Windows - Node.js version manager",
    version,
    author,
    long_about = "nvmw manages Node.js installations on Windows and keeps itself up to date."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the global config file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable progress spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade nvmw to the latest release
    Upgrade(upgrade::UpgradeCommand),

    /// Check a release channel and notify when something new is available
    CheckForUpdates(check::CheckCommand),

    /// Manage the scheduled update checks
    Schedule(schedule::ScheduleCommand),

    /// Print the version
    Version,

    /// Replace the executable once the upgrading process has exited
    #[command(hide = true)]
    Watch(watch::WatchCommand),

    /// Remove the pre-upgrade backup
    #[command(hide = true)]
    CleanupBackup(cleanup::CleanupCommand),
}

impl Cli {
    /// Initialize logging and run the selected command.
    pub async fn execute(self) -> Result<ExitCode> {
        let config = self.build_config();

        if let Commands::Watch(cmd) = &self.command {
            logging::init_file(&cmd.log_file)?;
        } else {
            logging::init(config.log_level.as_deref(), config.quiet);
        }

        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            quiet: self.quiet,
            verbose: self.verbose,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<ExitCode> {
        match self.command {
            Commands::Upgrade(cmd) => cmd.execute(&config).await,
            Commands::CheckForUpdates(cmd) => cmd.execute(&config).await.map(|()| ExitCode::SUCCESS),
            Commands::Schedule(cmd) => cmd.execute().map(|()| ExitCode::SUCCESS),
            Commands::Version => {
                println!("{}", env!("CARGO_PKG_VERSION"));
                Ok(ExitCode::SUCCESS)
            }
            Commands::Watch(cmd) => cmd.execute().await,
            Commands::CleanupBackup(cmd) => cmd.execute().map(|()| ExitCode::SUCCESS),
        }
    }
}
