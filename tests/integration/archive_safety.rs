//! Hostile release archives.

use super::{Installation, snapshot};
use nvmw_cli::constants::{PAYLOAD_DIR, PRIMARY_EXECUTABLE, STAGING_DIR};
use nvmw_cli::core::NvmwError;
use nvmw_cli::test_utils::{FakeLauncher, StaticTransport, md5_hex, release_json, write_zip};
use nvmw_cli::upgrade::config::UpgradeConfig;
use nvmw_cli::upgrade::status::{self, StatusEvent};
use nvmw_cli::upgrade::{ReplacementOrchestrator, UpgradeState};
use nvmw_cli::version::Version;
use std::fs;

const BASE: &str = "https://downloads.test";
const RELEASE_URL: &str = "https://feed.test/latest";
const ADVISORY_URL: &str = "https://feed.test/alerts";

async fn run_with_archive(
    install: &Installation,
    entries: &[(&str, &str)],
) -> (anyhow::Result<()>, Vec<UpgradeState>, Vec<StatusEvent>) {
    let zip_path = install.temp.path().join("release.zip");
    write_zip(&zip_path, entries).unwrap();
    let archive = fs::read(&zip_path).unwrap();
    fs::remove_file(&zip_path).unwrap();

    let transport = StaticTransport::new()
        .with_body(RELEASE_URL, release_json("1.2.0", BASE))
        .with_body(ADVISORY_URL, "{}")
        .with_body(format!("{BASE}/nvm-noinstall.zip"), archive.clone())
        .with_body(format!("{BASE}/nvm-noinstall.zip.checksum.txt"), md5_hex(&archive))
        .with_body(format!("{BASE}/update.exe"), "installer");
    let config = UpgradeConfig {
        release_url: RELEASE_URL.to_string(),
        advisory_url: ADVISORY_URL.to_string(),
        ..UpgradeConfig::default()
    };

    let (tx, mut stream) = status::channel();
    let mut orchestrator = ReplacementOrchestrator::new(
        transport,
        FakeLauncher::default(),
        config,
        install.exe(),
        Version::parse("1.1.12").unwrap(),
        tx,
    );
    let result = orchestrator.run_until(std::future::pending()).await.map(|_| ());
    (result, orchestrator.history().to_vec(), stream.drain())
}

#[tokio::test]
async fn test_traversal_entries_are_skipped_but_update_proceeds() {
    let install = Installation::new();
    let outside_before = snapshot(install.temp.path());

    let (result, _, events) = run_with_archive(
        &install,
        &[
            (PRIMARY_EXECUTABLE, "new binary"),
            ("../../evil.exe", "evil"),
            ("docs/../../../evil2.exe", "evil"),
            ("elevate.cmd", "cmd"),
        ],
    )
    .await;
    result.unwrap();

    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StatusEvent::Warn(text) if text.contains("unsafe archive entry") => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 2);

    // Nothing was written outside the staging directory.
    assert_eq!(snapshot(install.temp.path()), outside_before);
    let staging = install.dir.join(STAGING_DIR);
    assert!(staging.join(PAYLOAD_DIR).join("elevate.cmd").exists());
    assert!(!staging.join(PAYLOAD_DIR).join("evil.exe").exists());
}

#[tokio::test]
async fn test_archive_of_only_unsafe_entries_is_rejected() {
    let install = Installation::new();
    let before = install.snapshot();

    let (result, history, events) =
        run_with_archive(&install, &[("../nvm.exe", "evil"), ("../../settings.txt", "evil")]).await;

    let err = result.unwrap_err();
    assert!(matches!(err.downcast_ref::<NvmwError>(), Some(NvmwError::UnsafeArchive { skipped: 2 })));
    assert!(!history.contains(&UpgradeState::BackingUp));
    assert_eq!(history.last(), Some(&UpgradeState::Fatal));
    assert!(matches!(events.last(), Some(StatusEvent::Err(_))));
    assert_eq!(install.snapshot(), before);
    assert!(!install.dir.join(STAGING_DIR).exists());
}

#[tokio::test]
async fn test_archive_without_executable_is_rejected() {
    let install = Installation::new();
    let before = install.snapshot();

    let (result, history, _) = run_with_archive(&install, &[("README.md", "no binary here")]).await;

    let err = result.unwrap_err();
    assert!(matches!(err.downcast_ref::<NvmwError>(), Some(NvmwError::MissingExecutable { .. })));
    assert!(!history.contains(&UpgradeState::Staging));
    assert_eq!(install.snapshot(), before);
}
