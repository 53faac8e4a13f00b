//! Well-known names, endpoints, and timing defaults shared across the updater.
//!
//! Anything that has to match an external party (the release feed, the
//! scheduled-task names other installations registered, the relaunch protocol)
//! lives here so the value is defined exactly once.

use std::time::Duration;

/// Latest-release endpoint of the project's GitHub repository.
pub const RELEASE_URL: &str = "https://api.github.com/repos/coreybutler/nvm-windows/releases/latest";

/// Operator-authored advisory feed, keyed by version string or `"all"`.
pub const ADVISORY_URL: &str = "https://author.io/nvm4w/feed/alerts";

/// User agent sent with every feed and download request.
pub const USER_AGENT: &str = "nvm-windows";

/// Key in the advisory feed that applies to every version.
pub const GLOBAL_ADVISORY_KEY: &str = "all";

/// Release asset holding the portable installation archive.
pub const PRIMARY_ASSET: &str = "nvm-noinstall.zip";

/// Optional secondary installer asset.
pub const INSTALLER_ASSET: &str = "update.exe";

/// Suffix appended to the archive URL to locate its digest sidecar.
pub const CHECKSUM_SUFFIX: &str = ".checksum.txt";

/// File name of the primary executable inside the release archive.
#[cfg(windows)]
pub const PRIMARY_EXECUTABLE: &str = "nvm.exe";
/// File name of the primary executable inside the release archive.
#[cfg(not(windows))]
pub const PRIMARY_EXECUTABLE: &str = "nvm";

/// Hidden subdirectory of the installation that holds staged artifacts.
pub const STAGING_DIR: &str = ".update";

/// Subdirectory of [`STAGING_DIR`] holding non-executable release files.
pub const PAYLOAD_DIR: &str = "payload";

/// Backup archive name inside [`STAGING_DIR`].
pub const BACKUP_ARCHIVE: &str = "nvm4w-backup.zip";

/// Retention record name inside [`STAGING_DIR`].
pub const BACKUP_RECORD: &str = "backup.json";

/// Log file the Watcher writes inside [`STAGING_DIR`].
pub const WATCHER_LOG: &str = "watcher.log";

/// Log file fatal orchestrator errors are appended to, under the data directory.
pub const ERROR_LOG: &str = "upgrade-error.log";

/// Scheduled task that removes the staging directory after retention.
pub const BACKUP_CLEANUP_TASK: &str = "RemoveNVM4WBackup";

/// Days a pre-update snapshot is retained before scheduled deletion.
pub const BACKUP_RETENTION_DAYS: u32 = 7;

/// Time of day the backup cleanup task fires.
pub const BACKUP_CLEANUP_TIME: &str = "12:00";

/// Application id shown on desktop notifications.
pub const NOTIFICATION_APP_ID: &str = "NVM for Windows";

/// External notifier helper shipped next to the binary.
#[cfg(windows)]
pub const NOTIFIER_EXECUTABLE: &str = "nvmw-notify.exe";
/// External notifier helper shipped next to the binary.
#[cfg(not(windows))]
pub const NOTIFIER_EXECUTABLE: &str = "nvmw-notify";

/// Scheme of the registered application launch trigger.
pub const LAUNCH_PROTOCOL: &str = "nvm://launch";

/// Interval between Watcher probes of the parent process id.
pub const WATCHER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest the Watcher waits for the parent to exit before aborting.
pub const WATCHER_MAX_WAIT: Duration = Duration::from_secs(600);

/// Timeout applied to each HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum backoff delay between HTTP retries (2 seconds).
pub const MAX_BACKOFF_DELAY_MS: u64 = 2_000;

/// Starting delay for HTTP retry backoff (100ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 100;

/// Attempts made for a transient network failure before giving up.
pub const HTTP_RETRY_ATTEMPTS: usize = 3;

/// Environment variable that disables spinners and progress bars.
pub const NO_PROGRESS_ENV: &str = "NVMW_NO_PROGRESS";

/// Environment variable overriding the global config location.
pub const CONFIG_PATH_ENV: &str = "NVMW_CONFIG_PATH";
