//! Global configuration file for nvmw.
//!
//! # Configuration File Location
//!
//! - **Windows**: `%LOCALAPPDATA%\nvmw\config.toml`
//! - **Unix/macOS**: `~/.nvmw/config.toml`
//!
//! The location can be overridden with the `NVMW_CONFIG_PATH` environment
//! variable or the global `--config` flag. A missing file is not an error; every
//! setting has a default.
//!
//! # File Format
//!
//! ```toml
//! [upgrade]
//! release_url = "https://api.github.com/repos/coreybutler/nvm-windows/releases/latest"
//! advisory_url = "https://author.io/nvm4w/feed/alerts"
//! backup_retention_days = 14
//! watcher_max_wait_secs = 300
//! ```

use crate::constants::CONFIG_PATH_ENV;
use crate::upgrade::config::UpgradeConfig;
use crate::utils::platform::data_dir;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const CONFIG_FILE: &str = "config.toml";

/// User-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Self-update settings, handed to every updater component.
    #[serde(default, skip_serializing_if = "UpgradeConfig::is_default")]
    pub upgrade: UpgradeConfig,
}

impl GlobalConfig {
    /// Load from the default location, or defaults if there is no file.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use nvmw_cli::config::GlobalConfig;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let config = GlobalConfig::load().await?;
    /// println!("Releases from {}", config.upgrade.release_url);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, otherwise from the default location.
    ///
    /// A file that does not exist yields the defaults.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Write as pretty TOML, creating parent directories as needed.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    /// Path of the config file: `NVMW_CONFIG_PATH` if set, otherwise
    /// `config.toml` in the nvmw data directory.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        Ok(data_dir()?.join(CONFIG_FILE))
    }

    /// Directory holding the config file, also used for the error log.
    pub fn config_dir(path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        Ok(path.parent().map(Path::to_path_buf).unwrap_or_default())
    }
}
