//! Hidden `nvmw cleanup-backup`, run by the one-shot cleanup task.

use crate::constants::STAGING_DIR;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::scheduler::{TaskScheduler, system_scheduler};
use anyhow::{Result, bail};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct CleanupCommand {
    /// Staging directory holding the backup
    #[arg(long)]
    pub dir: PathBuf,
}

impl CleanupCommand {
    pub fn execute(self) -> Result<()> {
        purge(&self.dir, system_scheduler().as_ref())
    }
}

/// Remove `dir`, refusing anything that is not an update staging directory.
fn purge(dir: &Path, scheduler: &dyn TaskScheduler) -> Result<()> {
    if dir.file_name().is_none_or(|name| name != STAGING_DIR) {
        bail!("Refusing to remove {}: not an update staging directory", dir.display());
    }
    if !dir.exists() {
        info!("{} is already gone", dir.display());
    }
    BackupManager::purge(dir, scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BACKUP_CLEANUP_TASK;
    use crate::test_utils::RecordingScheduler;
    use tempfile::TempDir;

    #[test]
    fn test_purges_staging_dir_and_task() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(STAGING_DIR);
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("nvm4w-backup.zip"), b"zip").unwrap();

        let scheduler = RecordingScheduler::default();
        purge(&staging, &scheduler).unwrap();
        assert!(!staging.exists());
        assert_eq!(scheduler.unregistered(), vec![BACKUP_CLEANUP_TASK]);
    }

    #[test]
    fn test_refuses_other_directories() {
        let temp = TempDir::new().unwrap();
        let err = purge(temp.path(), &RecordingScheduler::default()).unwrap_err();
        assert!(err.to_string().contains("Refusing"));
        assert!(temp.path().exists());
    }
}
