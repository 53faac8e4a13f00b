//! The hidden `watch` command as a separate process, the way `upgrade` starts it.

use assert_cmd::Command;
use nvmw_cli::constants::{PAYLOAD_DIR, PRIMARY_EXECUTABLE, STAGING_DIR, WATCHER_LOG};
use nvmw_cli::upgrade::watcher::WatchPlan;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// PID of a process that has already exited and been reaped.
fn exited_pid() -> u32 {
    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_nvmw"))
        .arg("version")
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

fn staged_install(root: &Path) -> WatchPlan {
    let install = root.join("nvm");
    let staging = install.join(STAGING_DIR);
    fs::create_dir_all(staging.join(PAYLOAD_DIR)).unwrap();
    fs::write(install.join(PRIMARY_EXECUTABLE), b"old binary").unwrap();
    fs::write(staging.join(PRIMARY_EXECUTABLE), b"new binary 1.2.0").unwrap();
    fs::write(staging.join(PAYLOAD_DIR).join("elevate.cmd"), b"elevate").unwrap();

    WatchPlan {
        parent_pid: exited_pid(),
        staged: staging.join(PRIMARY_EXECUTABLE),
        target: install.join(PRIMARY_EXECUTABLE),
        payload_dir: Some(staging.join(PAYLOAD_DIR)),
        backup_record: None,
        log_file: staging.join(WATCHER_LOG),
        version: "1.2.0".to_string(),
        poll_interval: Duration::from_millis(10),
        max_wait: Duration::from_secs(5),
    }
}

fn watch(plan: &WatchPlan) -> Command {
    let mut cmd = Command::cargo_bin("nvmw").unwrap();
    cmd.args(plan.to_args()).env_remove("RUST_LOG");
    cmd
}

// Relaunching through the protocol handler is only possible on Windows.
#[cfg(not(windows))]
#[test]
fn test_watch_swaps_executable_and_removes_log() {
    let temp = TempDir::new().unwrap();
    let plan = staged_install(temp.path());

    watch(&plan).timeout(Duration::from_secs(30)).assert().success();

    assert_eq!(fs::read(&plan.target).unwrap(), b"new binary 1.2.0");
    assert!(!plan.staged.exists());
    assert_eq!(fs::read(temp.path().join("nvm").join("elevate.cmd")).unwrap(), b"elevate");
    assert!(!plan.log_file.exists());
}

#[test]
fn test_failed_watch_keeps_log_and_target() {
    let temp = TempDir::new().unwrap();
    let plan = staged_install(temp.path());
    fs::remove_file(&plan.staged).unwrap();

    watch(&plan).timeout(Duration::from_secs(30)).assert().failure();

    assert_eq!(fs::read(&plan.target).unwrap(), b"old binary");
    let log = fs::read_to_string(&plan.log_file).unwrap();
    assert!(log.contains("is missing"), "unexpected watcher log: {log}");
}
