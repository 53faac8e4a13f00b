//! `nvmw upgrade`.

use crate::cli::CliConfig;
use crate::config::GlobalConfig;
use crate::constants::{ERROR_LOG, STAGING_DIR};
use crate::upgrade::backup::BackupManager;
use crate::upgrade::metadata::{HttpTransport, UpdateMetadataFetcher};
use crate::upgrade::notify::BridgeNotifier;
use crate::upgrade::status::{self, ConsoleReporter, NotificationForwarder};
use crate::upgrade::watcher::DetachedLauncher;
use crate::upgrade::{ReplacementOrchestrator, UpgradeOutcome};
use crate::version::Version;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing::debug;

/// Command-line arguments for `nvmw upgrade`.
///
/// # Examples
///
/// ```bash
/// nvmw upgrade --check      # Is there anything newer?
/// nvmw upgrade --status     # Current version and pending backup
/// nvmw upgrade              # Download, stage and hand off to the Watcher
/// ```
#[derive(Args, Debug)]
pub struct UpgradeCommand {
    /// Report progress as desktop notifications instead of console output
    #[arg(long)]
    pub show_progress_ui: bool,

    /// Only check whether an update is available
    #[arg(long, conflicts_with = "status")]
    pub check: bool,

    /// Show the installed version and the retained backup
    #[arg(short, long)]
    pub status: bool,
}

impl UpgradeCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<ExitCode> {
        let global = config.load_global().await?;
        let upgrade = global.upgrade.clone().with_verbose(config.verbose);

        let current_exe = env::current_exe().context("Failed to get current executable path")?;
        let install_dir =
            current_exe.parent().map(Path::to_path_buf).context("Executable has no parent directory")?;
        let current = Version::parse(env!("CARGO_PKG_VERSION"))?;

        if self.status {
            show_status(&install_dir, &current)?;
            return Ok(ExitCode::SUCCESS);
        }

        let transport = HttpTransport::new(&upgrade)?;

        if self.check {
            check_for_update(UpdateMetadataFetcher::new(transport, &upgrade), &current).await?;
            return Ok(ExitCode::SUCCESS);
        }

        let error_log = GlobalConfig::config_dir(config.config_path.as_deref())?.join(ERROR_LOG);
        let (tx, stream) = status::channel();
        let mut orchestrator = ReplacementOrchestrator::new(
            transport,
            DetachedLauncher::default(),
            upgrade,
            current_exe,
            current,
            tx,
        )
        .with_error_log(error_log);

        let result = if self.show_progress_ui {
            let mut forwarder = NotificationForwarder::new(BridgeNotifier::in_dir(&install_dir));
            let (result, _) = tokio::join!(orchestrator.run(), stream.run(&mut forwarder));
            result
        } else {
            let mut reporter = ConsoleReporter::new(config.show_progress());
            let (result, _) = tokio::join!(orchestrator.run(), stream.run(&mut reporter));
            result
        };

        match result {
            Ok(UpgradeOutcome::Launched {
                watcher_pid,
                ..
            }) => {
                debug!("Handing off to watcher PID {}", watcher_pid);
                Ok(ExitCode::SUCCESS)
            }
            Ok(outcome) => {
                debug!("Upgrade finished: {:?}", outcome);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                // Already reported through the status stream and the error log.
                debug!("Upgrade failed: {:#}", e);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn show_status(install_dir: &Path, current: &Version) -> Result<()> {
    println!("nvm {}", current.to_string().bold());
    println!("Installed at {}", install_dir.display());

    let staging = install_dir.join(STAGING_DIR);
    match BackupManager::load_record(&staging)? {
        Some(record) => {
            println!(
                "Backup {} kept until {}",
                record.archive_path.display(),
                record.retention_expiry.format("%Y-%m-%d %H:%M UTC")
            );
        }
        None => println!("{}", "No pre-upgrade backup is retained".dimmed()),
    }
    Ok(())
}

async fn check_for_update(
    fetcher: UpdateMetadataFetcher<HttpTransport>,
    current: &Version,
) -> Result<()> {
    println!("{}", "Checking for updates...".cyan());
    let descriptor = fetcher.fetch().await.context("Failed to check for updates")?;

    for warning in &descriptor.global_warnings {
        println!("⚠️  {}", warning.yellow());
    }

    let (version, newer) = descriptor.available(current);
    if newer {
        for warning in &descriptor.version_warnings {
            println!("⚠️  {}", warning.yellow());
        }
        println!("{}", format!("Update available: {current} -> {version}").green());
        println!("Run `nvmw upgrade` to install it");
    } else {
        println!("{}", format!("You are on the latest version ({current})").green());
    }
    Ok(())
}
