//! The Watcher: swaps the executable after the updating process has exited.
//!
//! A running executable cannot be overwritten on Windows, so the orchestrator
//! stages the new binary and starts a detached copy of itself with the hidden
//! `watch` command. That process shares nothing with its parent except the file
//! system and the process table. It waits for the parent's PID to disappear and
//! then walks a fixed sequence of states:
//!
//! ```text
//! AwaitingParentExit → VerifyingStaged → ProbingTarget → Swapping → VerifyingSwap
//!   → RemovingStaged → ApplyingPayload → RegisteringCleanup → Relaunch → Done
//! ```
//!
//! Any failure moves to `Failed` and stops; there is nobody left to recover.
//! The staged file is only removed once the copy at the target path has been
//! confirmed, so a failed swap always leaves the staged binary in place.

use crate::core::NvmwError;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::notify::{LaunchSignal, Relauncher};
use crate::upgrade::scheduler::TaskScheduler;
use crate::utils::fs::{copy_dir, remove_dir_all};
use crate::utils::platform::detach;
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use sysinfo::{Pid, System};
use tracing::{debug, error, info, warn};

/// Prefix of the scratch directory the Watcher binary runs from.
pub const WATCHER_SCRATCH_PREFIX: &str = "nvmw-watcher-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    AwaitingParentExit,
    VerifyingStaged,
    ProbingTarget,
    Swapping,
    VerifyingSwap,
    RemovingStaged,
    ApplyingPayload,
    RegisteringCleanup,
    Relaunch,
    Done,
    Failed,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AwaitingParentExit => "waiting for the parent process to exit",
            Self::VerifyingStaged => "verifying the staged executable",
            Self::ProbingTarget => "probing the installation directory",
            Self::Swapping => "replacing the executable",
            Self::VerifyingSwap => "verifying the replaced executable",
            Self::RemovingStaged => "removing the staged executable",
            Self::ApplyingPayload => "applying support files",
            Self::RegisteringCleanup => "scheduling backup cleanup",
            Self::Relaunch => "signalling relaunch",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Everything the Watcher needs, passed on its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchPlan {
    pub parent_pid: u32,
    /// New executable inside the staging directory.
    pub staged: PathBuf,
    /// Executable being replaced.
    pub target: PathBuf,
    /// Support files copied next to `target` after the swap.
    pub payload_dir: Option<PathBuf>,
    /// Retention record of the pre-update backup.
    pub backup_record: Option<PathBuf>,
    pub log_file: PathBuf,
    /// Version announced in the relaunch signal.
    pub version: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl WatchPlan {
    /// Arguments for `nvmw watch`.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "watch".to_string(),
            "--pid".to_string(),
            self.parent_pid.to_string(),
            "--staged".to_string(),
            self.staged.display().to_string(),
            "--target".to_string(),
            self.target.display().to_string(),
            "--relaunch-version".to_string(),
            self.version.clone(),
            "--log-file".to_string(),
            self.log_file.display().to_string(),
            "--poll-interval-ms".to_string(),
            self.poll_interval.as_millis().to_string(),
            "--max-wait-secs".to_string(),
            self.max_wait.as_secs().to_string(),
        ];
        if let Some(payload) = &self.payload_dir {
            args.push("--payload".to_string());
            args.push(payload.display().to_string());
        }
        if let Some(record) = &self.backup_record {
            args.push("--backup-record".to_string());
            args.push(record.display().to_string());
        }
        args
    }
}

/// Answers whether a process is still alive.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, pid: u32) -> bool;
}

/// Process-table lookup through `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_running(&self, pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_process(Pid::from_u32(pid))
    }
}

/// Starts the Watcher process.
pub trait WatcherLauncher: Send + Sync {
    /// Launch a Watcher for `plan`, returning its PID.
    fn launch(&self, plan: &WatchPlan) -> Result<u32>;
}

/// Runs a scratch copy of the current executable, detached, with `watch`.
///
/// The copy lives in its own temp directory so the installation's executable is
/// free to be replaced; the Watcher deletes the copy when it is done.
#[derive(Debug, Clone, Default)]
pub struct DetachedLauncher {
    exe: Option<PathBuf>,
}

impl DetachedLauncher {
    /// Launch copies of `exe` instead of the running executable.
    pub fn with_executable(exe: impl Into<PathBuf>) -> Self {
        Self {
            exe: Some(exe.into()),
        }
    }

    fn launch_inner(&self, plan: &WatchPlan) -> Result<u32> {
        let exe = match &self.exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe().context("Unable to locate the running executable")?,
        };
        let file_name = exe.file_name().context("Executable path has no file name")?;

        let scratch = tempfile::Builder::new().prefix(WATCHER_SCRATCH_PREFIX).tempdir()?.keep();
        let copy = scratch.join(file_name);
        fs::copy(&exe, &copy)
            .with_context(|| format!("Failed to copy {} to {}", exe.display(), copy.display()))?;
        debug!("Watcher binary copied to {}", copy.display());

        let mut command = Command::new(&copy);
        command.args(plan.to_args());
        detach(&mut command);
        let child = command.spawn().with_context(|| format!("Failed to start {}", copy.display()))?;
        Ok(child.id())
    }
}

impl WatcherLauncher for DetachedLauncher {
    fn launch(&self, plan: &WatchPlan) -> Result<u32> {
        let pid = self.launch_inner(plan).map_err(|e| NvmwError::WatcherLaunchFailed {
            reason: format!("{e:#}"),
        })?;
        info!("Update watcher started with PID {}", pid);
        Ok(pid)
    }
}

/// Whether `exe` is a Watcher scratch copy rather than an installed binary.
#[must_use]
pub fn is_scratch_copy(exe: &Path) -> bool {
    exe.parent()
        .and_then(Path::file_name)
        .is_some_and(|name| name.to_string_lossy().starts_with(WATCHER_SCRATCH_PREFIX))
}

/// Delete the running executable if it is a Watcher scratch copy.
pub fn remove_scratch_copy() -> Result<()> {
    let exe = std::env::current_exe()?;
    if is_scratch_copy(&exe) {
        debug!("Removing watcher scratch copy {}", exe.display());
        self_replace::self_delete().context("Failed to remove watcher scratch copy")?;
    }
    Ok(())
}

/// The swap state machine.
pub struct Watcher {
    plan: WatchPlan,
    probe: Box<dyn ProcessProbe>,
    scheduler: Box<dyn TaskScheduler>,
    relauncher: Box<dyn Relauncher>,
    history: Vec<WatcherState>,
}

impl Watcher {
    pub fn new(
        plan: WatchPlan,
        probe: Box<dyn ProcessProbe>,
        scheduler: Box<dyn TaskScheduler>,
        relauncher: Box<dyn Relauncher>,
    ) -> Self {
        Self {
            plan,
            probe,
            scheduler,
            relauncher,
            history: Vec::new(),
        }
    }

    /// Current state; `AwaitingParentExit` before [`run`](Self::run).
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.history.last().copied().unwrap_or(WatcherState::AwaitingParentExit)
    }

    /// Every state entered so far, in order.
    #[must_use]
    pub fn history(&self) -> &[WatcherState] {
        &self.history
    }

    fn enter(&mut self, state: WatcherState) {
        info!("Watcher: {}", state);
        self.history.push(state);
    }

    /// Run to `Done`, or stop at the first failure with
    /// [`NvmwError::WatcherFailed`].
    pub async fn run(&mut self) -> Result<()> {
        let steps = [
            WatcherState::AwaitingParentExit,
            WatcherState::VerifyingStaged,
            WatcherState::ProbingTarget,
            WatcherState::Swapping,
            WatcherState::VerifyingSwap,
            WatcherState::RemovingStaged,
            WatcherState::ApplyingPayload,
            WatcherState::RegisteringCleanup,
            WatcherState::Relaunch,
        ];

        for state in steps {
            self.enter(state);
            if let Err(e) = self.step(state).await {
                error!("Watcher failed while {}: {:#}", state, e);
                self.enter(WatcherState::Failed);
                return Err(NvmwError::WatcherFailed {
                    state: state.to_string(),
                    reason: format!("{e:#}"),
                }
                .into());
            }
        }

        self.enter(WatcherState::Done);
        Ok(())
    }

    async fn step(&self, state: WatcherState) -> Result<()> {
        match state {
            WatcherState::AwaitingParentExit => self.await_parent_exit().await,
            WatcherState::VerifyingStaged => self.verify_staged(),
            WatcherState::ProbingTarget => self.probe_target(),
            WatcherState::Swapping => self.swap(),
            WatcherState::VerifyingSwap => self.verify_swap(),
            WatcherState::RemovingStaged => self.remove_staged(),
            WatcherState::ApplyingPayload => self.apply_payload(),
            WatcherState::RegisteringCleanup => self.register_cleanup(),
            WatcherState::Relaunch => {
                self.relauncher.relaunch(&LaunchSignal::upgrade_notify(self.plan.version.clone()))
            }
            WatcherState::Done | WatcherState::Failed => Ok(()),
        }
    }

    async fn await_parent_exit(&self) -> Result<()> {
        let pid = self.plan.parent_pid;
        let started = tokio::time::Instant::now();

        while self.probe.is_running(pid) {
            if started.elapsed() >= self.plan.max_wait {
                anyhow::bail!(
                    "process {pid} was still running after {}s",
                    self.plan.max_wait.as_secs()
                );
            }
            tokio::time::sleep(self.plan.poll_interval).await;
        }

        debug!("Process {} exited after {:?}", pid, started.elapsed());
        Ok(())
    }

    fn verify_staged(&self) -> Result<()> {
        if !self.plan.staged.is_file() {
            anyhow::bail!("staged executable {} is missing", self.plan.staged.display());
        }
        Ok(())
    }

    fn target_dir(&self) -> Result<&Path> {
        self.plan
            .target
            .parent()
            .with_context(|| format!("{} has no parent directory", self.plan.target.display()))
    }

    fn probe_target(&self) -> Result<()> {
        let probe = self.target_dir()?.join(format!(".nvmw-write-probe-{}", uuid::Uuid::new_v4()));
        fs::write(&probe, b"probe")
            .with_context(|| format!("{} is not writable", probe.display()))?;
        fs::remove_file(&probe)
            .with_context(|| format!("Failed to remove write probe {}", probe.display()))?;
        Ok(())
    }

    fn swap(&self) -> Result<()> {
        let bytes = fs::copy(&self.plan.staged, &self.plan.target).with_context(|| {
            format!(
                "Failed to copy {} over {}",
                self.plan.staged.display(),
                self.plan.target.display()
            )
        })?;
        debug!("Copied {} bytes to {}", bytes, self.plan.target.display());
        Ok(())
    }

    fn verify_swap(&self) -> Result<()> {
        if !self.plan.target.is_file() {
            anyhow::bail!("{} does not exist after the copy", self.plan.target.display());
        }
        let staged = fs::metadata(&self.plan.staged)?.len();
        let target = fs::metadata(&self.plan.target)?.len();
        if staged != target {
            anyhow::bail!("copied executable is {target} bytes, expected {staged}");
        }
        Ok(())
    }

    fn remove_staged(&self) -> Result<()> {
        fs::remove_file(&self.plan.staged)
            .with_context(|| format!("Failed to delete {}", self.plan.staged.display()))?;
        if self.plan.staged.exists() {
            anyhow::bail!("{} still exists after deletion", self.plan.staged.display());
        }
        Ok(())
    }

    fn apply_payload(&self) -> Result<()> {
        let Some(payload) = self.plan.payload_dir.as_deref().filter(|dir| dir.is_dir()) else {
            debug!("No support files to apply");
            return Ok(());
        };
        let copied = copy_dir(payload, self.target_dir()?)?;
        info!("Applied {} support files", copied);
        remove_dir_all(payload)
    }

    fn register_cleanup(&self) -> Result<()> {
        let Some(record_path) = self.plan.backup_record.as_deref() else {
            debug!("No backup record; nothing to schedule");
            return Ok(());
        };
        let staging_dir = record_path.parent().context("Backup record has no parent directory")?;
        let Some(record) = BackupManager::load_record(staging_dir)? else {
            warn!("Backup record {} is missing; skipping cleanup task", record_path.display());
            return Ok(());
        };

        let task = BackupManager::cleanup_task(&record, &self.plan.target, staging_dir);
        match self.scheduler.register(&task) {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.downcast_ref::<NvmwError>(),
                    Some(NvmwError::SchedulerUnavailable)
                ) =>
            {
                warn!("Task scheduler unavailable; backup at {} kept", record.archive_path.display());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
