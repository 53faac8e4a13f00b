//! Subscriber setup for the `nvmw` binary.
//!
//! Interactive commands log to stderr. The Watcher runs detached with no
//! console, so it logs to a file inside the staging directory instead.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber.
///
/// `level` wins over `RUST_LOG`; with neither, only warnings are shown.
/// `None` together with `quiet` disables logging entirely.
pub fn init(level: Option<&str>, quiet: bool) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None if quiet => EnvFilter::new("off"),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Install a subscriber that appends to `path` at debug level.
pub fn init_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}
