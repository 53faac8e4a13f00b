//! Integration test suite for nvmw
//!
//! End-to-end tests for the update cycle and the command-line surface. The
//! update tests run the real orchestrator and Watcher against a temp
//! installation, with the network, task scheduler and process table replaced
//! by the fakes in `nvmw_cli::test_utils`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **archive_safety**: Unsafe archive entries never leave the scratch directory
//! - **cli**: Command parsing, hidden commands and exit codes through the binary
//! - **upgrade_cycle**: Orchestrator followed by the Watcher on one installation
//! - **watch_command**: The hidden `watch` command run as a real process

mod archive_safety;
mod cli;
mod upgrade_cycle;
mod watch_command;

use nvmw_cli::constants::PRIMARY_EXECUTABLE;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temp installation with an old executable and one support file.
pub struct Installation {
    pub temp: TempDir,
    pub dir: PathBuf,
}

impl Installation {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nvm");
        fs::create_dir_all(dir.join("v20.11.0")).unwrap();
        fs::write(dir.join(PRIMARY_EXECUTABLE), b"old binary").unwrap();
        fs::write(dir.join("settings.txt"), b"root: C:\\nvm").unwrap();
        fs::write(dir.join("v20.11.0").join("node.exe"), b"node").unwrap();
        Self {
            temp,
            dir,
        }
    }

    pub fn exe(&self) -> PathBuf {
        self.dir.join(PRIMARY_EXECUTABLE)
    }

    /// Relative path and content of every file outside `.update`.
    pub fn snapshot(&self) -> Vec<(String, Vec<u8>)> {
        snapshot(&self.dir)
    }
}

pub fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != nvmw_cli::constants::STAGING_DIR)
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}
