//! Configuration management for nvmw
//!
//! nvmw reads one user-wide TOML file, `config.toml` in the nvmw data
//! directory. Its `[upgrade]` table becomes the
//! [`UpgradeConfig`](crate::upgrade::config::UpgradeConfig) value that is
//! passed explicitly to every updater component; no component reads the file
//! or the environment on its own.
//!
//! # Location Priority
//!
//! 1. `--config <PATH>`
//! 2. `NVMW_CONFIG_PATH` environment variable
//! 3. `%LOCALAPPDATA%\nvmw\config.toml` on Windows, `~/.nvmw/config.toml`
//!    elsewhere
//!
//! The directory holding the file also receives `upgrade-error.log` when an
//! upgrade fails.

mod global;

pub use global::GlobalConfig;
