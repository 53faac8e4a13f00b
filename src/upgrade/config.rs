use crate::constants::{
    ADVISORY_URL, BACKUP_RETENTION_DAYS, HTTP_TIMEOUT, RELEASE_URL, USER_AGENT,
    WATCHER_MAX_WAIT, WATCHER_POLL_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the self-update engine.
///
/// `UpgradeConfig` is the single configuration value handed to every updater
/// component at construction: the metadata fetcher reads the feed URLs and user
/// agent, the backup manager reads the retention window, and the Watcher reads
/// its polling cadence and maximum wait. Nothing in the updater consults
/// process-wide state for these values.
///
/// # Sources
///
/// The persisted fields come from the `[upgrade]` table of the global
/// `config.toml`; `verbose` is a runtime flag set from the command line and is
/// never written back.
///
/// # TOML Example
/// ```toml
/// [upgrade]
/// release_url = "https://api.github.com/repos/coreybutler/nvm-windows/releases/latest"
/// advisory_url = "https://author.io/nvm4w/feed/alerts"
/// backup_retention_days = 7
/// watcher_poll_interval_ms = 1000
/// watcher_max_wait_secs = 600
/// ```
///
/// # Examples
///
/// ```rust
/// use nvmw_cli::upgrade::config::UpgradeConfig;
///
/// let config = UpgradeConfig::default().with_verbose(true);
/// assert_eq!(config.backup_retention_days, 7);
/// assert!(config.verbose);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Latest-release metadata endpoint.
    #[serde(default = "default_release_url")]
    pub release_url: String,

    /// Advisory feed endpoint.
    #[serde(default = "default_advisory_url")]
    pub advisory_url: String,

    /// `User-Agent` header for all requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Days the pre-update backup is kept before the cleanup task removes it.
    #[serde(default = "default_backup_retention_days")]
    pub backup_retention_days: u32,

    /// Interval between Watcher probes for the parent process, in milliseconds.
    #[serde(default = "default_watcher_poll_interval_ms")]
    pub watcher_poll_interval_ms: u64,

    /// Longest the Watcher waits for the parent to exit, in seconds.
    #[serde(default = "default_watcher_max_wait_secs")]
    pub watcher_max_wait_secs: u64,

    /// Per-request HTTP timeout, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// List extracted files and self-test the staged binary.
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            release_url: default_release_url(),
            advisory_url: default_advisory_url(),
            user_agent: default_user_agent(),
            backup_retention_days: default_backup_retention_days(),
            watcher_poll_interval_ms: default_watcher_poll_interval_ms(),
            watcher_max_wait_secs: default_watcher_max_wait_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            verbose: false,
        }
    }
}

fn default_release_url() -> String {
    RELEASE_URL.to_string()
}

fn default_advisory_url() -> String {
    ADVISORY_URL.to_string()
}

fn default_user_agent() -> String {
    USER_AGENT.to_string()
}

const fn default_backup_retention_days() -> u32 {
    BACKUP_RETENTION_DAYS
}

const fn default_watcher_poll_interval_ms() -> u64 {
    WATCHER_POLL_INTERVAL.as_millis() as u64
}

const fn default_watcher_max_wait_secs() -> u64 {
    WATCHER_MAX_WAIT.as_secs()
}

const fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT.as_secs()
}

impl UpgradeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the runtime verbose flag.
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether every persisted field still has its default value.
    #[must_use]
    pub fn is_default(&self) -> bool {
        let defaults = Self::default();
        Self {
            verbose: false,
            ..self.clone()
        } == defaults
    }

    /// Backup retention window. Never shorter than seven days.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.backup_retention_days.max(BACKUP_RETENTION_DAYS)))
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_interval_ms)
    }

    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_secs(self.watcher_max_wait_secs)
    }

    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
