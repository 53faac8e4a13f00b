//! Deferred and periodic task registration.
//!
//! The updater needs the OS task scheduler for two things: the one-shot task
//! that removes the pre-update backup once its retention window has passed, and
//! the hourly update-check tasks. Both go through [`TaskScheduler`] so that the
//! Watcher and the orchestrator can be exercised with a recording fake.

use crate::core::NvmwError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Recurrence keyword accepted by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Minute,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Once,
    OnStart,
    OnLogon,
    OnIdle,
    Event,
}

impl Interval {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "MINUTE",
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Once => "ONCE",
            Self::OnStart => "ONSTART",
            Self::OnLogon => "ONLOGON",
            Self::OnIdle => "ONIDLE",
            Self::Event => "EVENT",
        }
    }

    /// Whether `/st` applies. Trigger-based intervals have no start time.
    #[must_use]
    pub const fn is_time_based(self) -> bool {
        matches!(
            self,
            Self::Minute | Self::Hourly | Self::Daily | Self::Weekly | Self::Monthly | Self::Once
        )
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One task as handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: String,
    /// Full command line, already quoted.
    pub command: String,
    pub interval: Interval,
    /// `HH:MM`. Defaults to `00:00` for time-based intervals.
    pub start_time: Option<String>,
    pub start_date: Option<NaiveDate>,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, command: impl Into<String>, interval: Interval) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            interval,
            start_time: None,
            start_date: None,
        }
    }

    #[must_use]
    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.start_time = Some(time.into());
        self
    }

    #[must_use]
    pub const fn on(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    /// Start time passed to the scheduler, if the interval takes one.
    #[must_use]
    pub fn effective_start_time(&self) -> Option<&str> {
        if !self.interval.is_time_based() {
            return None;
        }
        Some(self.start_time.as_deref().unwrap_or("00:00"))
    }

    /// Arguments for `schtasks /create`.
    #[must_use]
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "/create".to_string(),
            "/tn".to_string(),
            self.name.clone(),
            "/tr".to_string(),
            self.command.clone(),
            "/sc".to_string(),
            self.interval.to_string(),
        ];
        if let Some(time) = self.effective_start_time() {
            args.push("/st".to_string());
            args.push(time.to_string());
        }
        if let Some(date) = self.start_date {
            args.push("/sd".to_string());
            args.push(date.format("%m/%d/%Y").to_string());
        }
        args.push("/f".to_string());
        args
    }
}

/// Registration and removal of named tasks.
pub trait TaskScheduler: Send + Sync {
    fn register(&self, task: &ScheduledTask) -> Result<()>;
    fn unregister(&self, name: &str) -> Result<()>;
}

/// The Windows `schtasks` command.
#[derive(Debug, Clone)]
pub struct Schtasks {
    program: PathBuf,
}

impl Schtasks {
    /// Locate `schtasks` on `PATH`.
    pub fn locate() -> Result<Self> {
        let program = which::which("schtasks").map_err(|_| NvmwError::SchedulerUnavailable)?;
        debug!("Using task scheduler at {}", program.display());
        Ok(Self {
            program,
        })
    }

    fn run(&self, task: &str, args: &[String]) -> Result<()> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let reason = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(NvmwError::SchedulerError {
                task: task.to_string(),
                reason,
            }
            .into());
        }
        Ok(())
    }
}

impl TaskScheduler for Schtasks {
    fn register(&self, task: &ScheduledTask) -> Result<()> {
        info!("Registering scheduled task '{}' ({})", task.name, task.interval);
        self.run(&task.name, &task.create_args())
    }

    fn unregister(&self, name: &str) -> Result<()> {
        info!("Removing scheduled task '{}'", name);
        let args = ["/delete", "/tn", name, "/f"].map(String::from);
        self.run(name, &args)
    }
}

/// Stand-in for hosts without `schtasks`. Every call fails with
/// [`NvmwError::SchedulerUnavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScheduler;

impl TaskScheduler for NoScheduler {
    fn register(&self, _task: &ScheduledTask) -> Result<()> {
        Err(NvmwError::SchedulerUnavailable.into())
    }

    fn unregister(&self, _name: &str) -> Result<()> {
        Err(NvmwError::SchedulerUnavailable.into())
    }
}

/// `schtasks` if it can be found, otherwise [`NoScheduler`].
pub fn system_scheduler() -> Box<dyn TaskScheduler> {
    match Schtasks::locate() {
        Ok(schtasks) => Box::new(schtasks),
        Err(e) => {
            debug!("{:#}", e);
            Box::new(NoScheduler)
        }
    }
}

/// Release channels that have a periodic update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum UpdateChannel {
    /// Node.js LTS releases.
    Lts,
    /// Node.js current releases.
    Current,
    /// nvmw itself.
    #[value(name = "self")]
    SelfUpdate,
    /// Messages from the tool's author.
    Vendor,
}

impl UpdateChannel {
    pub const ALL: [Self; 4] = [Self::Lts, Self::Current, Self::SelfUpdate, Self::Vendor];

    #[must_use]
    pub const fn task_name(self) -> &'static str {
        match self {
            Self::Lts => "NVM for Windows Node.js LTS Update Check",
            Self::Current => "NVM for Windows Node.js Current Update Check",
            Self::SelfUpdate => "NVM for Windows Update Check",
            Self::Vendor => "NVM for Windows Author Update Check",
        }
    }

    #[must_use]
    pub const fn start_time(self) -> &'static str {
        match self {
            Self::Lts => "00:30",
            Self::Current => "00:25",
            Self::SelfUpdate => "00:15",
            Self::Vendor => "00:45",
        }
    }

    #[must_use]
    pub const fn arg(self) -> &'static str {
        match self {
            Self::Lts => "lts",
            Self::Current => "current",
            Self::SelfUpdate => "self",
            Self::Vendor => "vendor",
        }
    }

    /// The hourly task that runs `check-for-updates` for this channel.
    #[must_use]
    pub fn task(self, exe: &Path) -> ScheduledTask {
        ScheduledTask::new(
            self.task_name(),
            format!("\"{}\" check-for-updates {}", exe.display(), self.arg()),
            Interval::Hourly,
        )
        .at(self.start_time())
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arg())
    }
}
