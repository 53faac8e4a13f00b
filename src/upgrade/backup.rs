use crate::constants::{
    BACKUP_ARCHIVE, BACKUP_CLEANUP_TASK, BACKUP_CLEANUP_TIME, BACKUP_RECORD, STAGING_DIR,
};
use crate::core::NvmwError;
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::scheduler::{Interval, ScheduledTask, TaskScheduler};
use crate::utils::fs::{read_json_file, remove_dir_all, write_json_file};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

/// Retention record for the pre-update snapshot, stored as `.update/backup.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub archive_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub retention_expiry: DateTime<Utc>,
}

impl BackupRecord {
    /// Local calendar date on which the cleanup task fires.
    ///
    /// The task runs at `12:00` local time; if the expiry falls after noon the
    /// task moves to the next day so it never fires before the expiry.
    #[must_use]
    pub fn cleanup_date(&self) -> NaiveDate {
        let expiry = self.retention_expiry.with_timezone(&Local);
        let noon = NaiveTime::parse_from_str(BACKUP_CLEANUP_TIME, "%H:%M").unwrap_or(NaiveTime::MIN);
        let date = expiry.date_naive();
        if expiry.time() > noon { date.succ_opt().unwrap_or(date) } else { date }
    }
}

/// Snapshots an installation before it is modified.
///
/// `BackupManager` zips the whole installation directory, minus its own
/// `.update` staging directory, into `.update/nvm4w-backup.zip` and writes a
/// [`BackupRecord`] next to it. The snapshot is kept for the retention window
/// (never less than seven days) and then removed by a one-shot scheduled task
/// running `nvmw cleanup-backup`.
///
/// Restoring from the snapshot is a manual operation; nothing in the updater
/// reads the archive back.
///
/// # Examples
///
/// ```rust,no_run
/// use nvmw_cli::upgrade::backup::BackupManager;
/// use nvmw_cli::upgrade::config::UpgradeConfig;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let manager = BackupManager::new(Path::new(r"C:\nvm4w"), &UpgradeConfig::default());
/// let record = manager.create_blocking(chrono::Utc::now())?;
/// println!("backup kept until {}", record.retention_expiry);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    install_dir: PathBuf,
    staging_dir: PathBuf,
    retention: chrono::Duration,
}

impl BackupManager {
    pub fn new(install_dir: &Path, config: &UpgradeConfig) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
            staging_dir: install_dir.join(STAGING_DIR),
            retention: config.retention(),
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.staging_dir.join(BACKUP_ARCHIVE)
    }

    pub fn record_path(&self) -> PathBuf {
        Self::record_path_in(&self.staging_dir)
    }

    pub fn record_path_in(staging_dir: &Path) -> PathBuf {
        staging_dir.join(BACKUP_RECORD)
    }

    /// Create the snapshot, replacing any previous one.
    ///
    /// Every failure is reported as [`NvmwError::BackupFailed`].
    pub fn create_blocking(&self, now: DateTime<Utc>) -> Result<BackupRecord> {
        let archive_path = self.archive_path();
        let failed = |e: &dyn std::fmt::Display| NvmwError::BackupFailed {
            path: archive_path.display().to_string(),
            reason: e.to_string(),
        };

        fs::create_dir_all(&self.staging_dir).map_err(|e| failed(&e))?;
        if archive_path.exists() {
            debug!("Removing old backup at {}", archive_path.display());
            fs::remove_file(&archive_path).map_err(|e| failed(&e))?;
        }

        info!("Creating backup of {} at {}", self.install_dir.display(), archive_path.display());
        let entries = self.write_archive(&archive_path).map_err(|e| failed(&format!("{e:#}")))?;

        let record = BackupRecord {
            archive_path: archive_path.clone(),
            created_at: now,
            retention_expiry: now + self.retention,
        };
        write_json_file(&self.record_path(), &record).map_err(|e| failed(&format!("{e:#}")))?;

        info!("Backup created ({} entries), kept until {}", entries, record.retention_expiry);
        Ok(record)
    }

    fn write_archive(&self, archive_path: &Path) -> Result<usize> {
        let file = fs::File::create(archive_path)?;
        let mut zip = zip::ZipWriter::new(file);
        let mut entries = 0;

        let walker = WalkDir::new(&self.install_dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| entry.path() != self.staging_dir);

        for entry in walker {
            let entry = entry?;
            let relative = entry.path().strip_prefix(&self.install_dir)?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let metadata = entry.metadata()?;
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .large_file(metadata.len() > u64::from(u32::MAX));
            #[cfg(unix)]
            let options = {
                use std::os::unix::fs::PermissionsExt;
                options.unix_permissions(metadata.permissions().mode())
            };

            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                zip.start_file(name, options)?;
                let mut source = fs::File::open(entry.path())
                    .with_context(|| format!("Failed to read {}", entry.path().display()))?;
                io::copy(&mut source, &mut zip)?;
            } else {
                continue;
            }
            entries += 1;
        }

        zip.finish()?;
        Ok(entries)
    }

    /// Read the retention record from a staging directory, if one exists.
    pub fn load_record(staging_dir: &Path) -> Result<Option<BackupRecord>> {
        let path = Self::record_path_in(staging_dir);
        if !path.exists() {
            return Ok(None);
        }
        read_json_file(&path).map(Some)
    }

    /// The one-shot task that removes `staging_dir` after the retention window.
    pub fn cleanup_task(record: &BackupRecord, exe: &Path, staging_dir: &Path) -> ScheduledTask {
        ScheduledTask::new(
            BACKUP_CLEANUP_TASK,
            format!("\"{}\" cleanup-backup --dir \"{}\"", exe.display(), staging_dir.display()),
            Interval::Once,
        )
        .at(BACKUP_CLEANUP_TIME)
        .on(record.cleanup_date())
    }

    /// Remove the staging directory and the cleanup task that points at it.
    ///
    /// Failing to unregister the task is logged; the directory removal is what
    /// matters.
    pub fn purge(staging_dir: &Path, scheduler: &dyn TaskScheduler) -> Result<()> {
        info!("Removing update staging directory {}", staging_dir.display());
        remove_dir_all(staging_dir)?;

        if let Err(e) = scheduler.unregister(BACKUP_CLEANUP_TASK) {
            warn!("Could not remove scheduled task {}: {:#}", BACKUP_CLEANUP_TASK, e);
        }
        Ok(())
    }
}
