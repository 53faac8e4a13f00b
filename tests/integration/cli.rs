//! The command-line surface, exercised through the built binary.

use assert_cmd::Command;
use nvmw_cli::constants::{BACKUP_ARCHIVE, CONFIG_PATH_ENV, NO_PROGRESS_ENV, STAGING_DIR};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn nvmw(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nvmw").unwrap();
    cmd.env(CONFIG_PATH_ENV, config_dir.path().join("config.toml"))
        .env(NO_PROGRESS_ENV, "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_public_commands_only() {
    let temp = TempDir::new().unwrap();
    nvmw(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("check-for-updates"))
        .stdout(predicate::str::contains("schedule"))
        .stdout(predicate::str::contains("watch").not())
        .stdout(predicate::str::contains("cleanup-backup").not());
}

#[test]
fn test_version_command() {
    let temp = TempDir::new().unwrap();
    nvmw(&temp)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_channel_is_rejected() {
    let temp = TempDir::new().unwrap();
    nvmw(&temp)
        .args(["check-for-updates", "nightly"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_node_channel_check_reports_missing_source() {
    let temp = TempDir::new().unwrap();
    nvmw(&temp)
        .args(["check-for-updates", "lts"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No release source configured"));
}

#[test]
fn test_check_and_status_conflict() {
    let temp = TempDir::new().unwrap();
    nvmw(&temp).args(["upgrade", "--check", "--status"]).assert().failure();
}

#[test]
fn test_upgrade_status_without_backup() {
    let temp = TempDir::new().unwrap();
    nvmw(&temp)
        .args(["upgrade", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed at"));
}

#[test]
fn test_malformed_config_is_reported() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("config.toml"), "[upgrade\nrelease_url = ").unwrap();
    nvmw(&temp)
        .args(["upgrade", "--status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}

#[test]
fn test_cleanup_refuses_foreign_directory() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("Documents");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("thesis.docx"), b"precious").unwrap();

    nvmw(&temp)
        .args(["cleanup-backup", "--dir"])
        .arg(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Refusing"));
    assert!(dir.join("thesis.docx").exists());
}

#[test]
fn test_cleanup_removes_staging_directory() {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("nvm").join(STAGING_DIR);
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join(BACKUP_ARCHIVE), b"zip").unwrap();

    nvmw(&temp).args(["cleanup-backup", "--dir"]).arg(&staging).assert().success();
    assert!(!staging.exists());
    assert!(temp.path().join("nvm").exists());
}
