//! Hidden `nvmw watch`, started by `nvmw upgrade` from a scratch copy.

use crate::upgrade::Watcher;
use crate::upgrade::notify::{LogRelauncher, Relauncher, UriRelauncher};
use crate::upgrade::scheduler::system_scheduler;
use crate::upgrade::watcher::{SystemProbe, WatchPlan, remove_scratch_copy};
use crate::utils::platform::is_windows;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Process to wait for
    #[arg(long)]
    pub pid: u32,

    /// Staged executable
    #[arg(long)]
    pub staged: PathBuf,

    /// Executable to replace
    #[arg(long)]
    pub target: PathBuf,

    /// Version announced when relaunching
    #[arg(long)]
    pub relaunch_version: String,

    /// Where to write the log
    #[arg(long)]
    pub log_file: PathBuf,

    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value_t = 600)]
    pub max_wait_secs: u64,

    /// Support files to copy next to the target
    #[arg(long)]
    pub payload: Option<PathBuf>,

    /// Retention record of the pre-upgrade backup
    #[arg(long)]
    pub backup_record: Option<PathBuf>,
}

impl WatchCommand {
    #[must_use]
    pub fn plan(&self) -> WatchPlan {
        WatchPlan {
            parent_pid: self.pid,
            staged: self.staged.clone(),
            target: self.target.clone(),
            payload_dir: self.payload.clone(),
            backup_record: self.backup_record.clone(),
            log_file: self.log_file.clone(),
            version: self.relaunch_version.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }

    /// Run the Watcher. Failures are logged to the log file, which is kept,
    /// and reported through the exit code.
    pub async fn execute(self) -> Result<ExitCode> {
        let plan = self.plan();
        info!("Watcher started for PID {} (nvm {})", plan.parent_pid, plan.version);

        let relauncher: Box<dyn Relauncher> =
            if is_windows() { Box::new(UriRelauncher) } else { Box::new(LogRelauncher) };
        let mut watcher = Watcher::new(plan, Box::new(SystemProbe), system_scheduler(), relauncher);
        let result = watcher.run().await;

        if let Err(e) = remove_scratch_copy() {
            warn!("{:#}", e);
        }

        match result {
            Ok(()) => {
                info!("Update applied");
                if let Err(e) = std::fs::remove_file(&self.log_file) {
                    debug!("Could not remove {}: {}", self.log_file.display(), e);
                }
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                error!("Update not applied: {:#}", e);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
