//! nvmw - NVM for Windows
//!
//! A Node.js version manager for Windows. This crate holds its self-update
//! engine: `nvmw upgrade` replaces the running executable with the latest
//! published release without a separate installer.
//!
//! # Architecture Overview
//!
//! A Windows executable cannot overwrite itself while it runs, so an upgrade is
//! split across two processes that share only the file system:
//!
//! 1. The upgrading process fetches the release descriptor, downloads and
//!    verifies the archive, snapshots the installation and stages the new files
//!    in the hidden `.update` directory. Nothing outside `.update` is touched.
//! 2. A detached Watcher waits for that process to exit, copies the staged
//!    executable over the original, schedules the backup for removal and
//!    relaunches the application through the `nvm://` protocol.
//!
//! # Core Modules
//!
//! - [`upgrade`] - The update engine: metadata, verification, extraction,
//!   backup, the orchestrator state machine and the Watcher
//! - [`version`] - Version parsing and ordering for release tags
//! - [`cli`] - Command-line interface
//! - [`config`] - Global configuration file (`config.toml`)
//! - [`core`] - Error types and user-facing error context
//!
//! ## Supporting Modules
//! - [`constants`] - Feed URLs, well-known file names and timing defaults
//! - [`logging`] - Subscriber setup for the console and the Watcher log file
//! - [`utils`] - File system, platform and progress helpers
//!
//! # Command-Line Usage
//!
//! ```bash
//! # Is there a newer release?
//! nvmw upgrade --check
//!
//! # Upgrade in place
//! nvmw upgrade
//!
//! # Register the hourly update checks
//! nvmw schedule register
//! ```

// Core functionality modules
pub mod cli;
pub mod config;
pub mod core;
pub mod upgrade;
pub mod version;

// Supporting modules
pub mod constants;
pub mod logging;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
