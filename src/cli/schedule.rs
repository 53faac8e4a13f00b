//! `nvmw schedule register|unregister`.

use crate::upgrade::scheduler::{Schtasks, TaskScheduler, UpdateChannel};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct ScheduleCommand {
    #[command(subcommand)]
    action: ScheduleAction,
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Register hourly update checks
    Register(ChannelSelection),
    /// Remove hourly update checks
    Unregister(ChannelSelection),
}

/// Channels to act on. No flags means all of them.
#[derive(Args, Debug, Default)]
struct ChannelSelection {
    /// Node.js LTS releases
    #[arg(long)]
    lts: bool,
    /// Node.js current releases
    #[arg(long)]
    current: bool,
    /// nvmw itself
    #[arg(long = "self")]
    self_update: bool,
    /// Author announcements
    #[arg(long)]
    vendor: bool,
}

impl ChannelSelection {
    fn channels(&self) -> Vec<UpdateChannel> {
        let selected: Vec<_> = [
            (self.lts, UpdateChannel::Lts),
            (self.current, UpdateChannel::Current),
            (self.self_update, UpdateChannel::SelfUpdate),
            (self.vendor, UpdateChannel::Vendor),
        ]
        .into_iter()
        .filter_map(|(on, channel)| on.then_some(channel))
        .collect();

        if selected.is_empty() { UpdateChannel::ALL.to_vec() } else { selected }
    }
}

impl ScheduleCommand {
    pub fn execute(self) -> Result<()> {
        let scheduler = Schtasks::locate()?;
        let exe = std::env::current_exe().context("Failed to get current executable path")?;
        for name in self.apply(&scheduler, &exe)? {
            println!("{} {}", "✓".green(), name);
        }
        Ok(())
    }

    /// Register or remove the selected tasks, returning their names.
    fn apply(&self, scheduler: &dyn TaskScheduler, exe: &Path) -> Result<Vec<String>> {
        let (selection, register) = match &self.action {
            ScheduleAction::Register(selection) => (selection, true),
            ScheduleAction::Unregister(selection) => (selection, false),
        };

        let mut names = Vec::new();
        for channel in selection.channels() {
            if register {
                scheduler.register(&channel.task(exe))?;
            } else {
                scheduler.unregister(channel.task_name())?;
            }
            names.push(channel.task_name().to_string());
        }
        Ok(names)
    }
}
