//! The whole update: the orchestrator stages, then the Watcher swaps.

use super::Installation;
use chrono::{Duration as ChronoDuration, Local};
use nvmw_cli::constants::{
    BACKUP_ARCHIVE, BACKUP_CLEANUP_TASK, BACKUP_CLEANUP_TIME, PRIMARY_EXECUTABLE, STAGING_DIR,
};
use nvmw_cli::core::NvmwError;
use nvmw_cli::test_utils::{
    CountdownProbe, FakeLauncher, RecordingRelauncher, RecordingScheduler, StaticTransport,
    md5_hex, release_json, write_zip,
};
use nvmw_cli::upgrade::backup::BackupManager;
use nvmw_cli::upgrade::config::UpgradeConfig;
use nvmw_cli::upgrade::notify::LaunchSignal;
use nvmw_cli::upgrade::status::{self, StatusEvent};
use nvmw_cli::upgrade::watcher::WatchPlan;
use nvmw_cli::upgrade::{ReplacementOrchestrator, UpgradeOutcome, UpgradeState, Watcher};
use nvmw_cli::version::Version;
use std::fs;

const BASE: &str = "https://downloads.test/v1.2.0";
const RELEASE_URL: &str = "https://feed.test/releases/latest";
const ADVISORY_URL: &str = "https://feed.test/alerts";

fn release_archive(install: &Installation) -> Vec<u8> {
    let path = install.temp.path().join("nvm-noinstall.zip");
    write_zip(
        &path,
        &[(PRIMARY_EXECUTABLE, "new binary 1.2.0"), ("elevate.cmd", "elevate"), ("LICENSE", "MIT")],
    )
    .unwrap();
    fs::read(path).unwrap()
}

fn feed(archive: &[u8], checksum: &str) -> StaticTransport {
    StaticTransport::new()
        .with_body(RELEASE_URL, release_json("1.2.0", BASE))
        .with_body(ADVISORY_URL, "{}")
        .with_body(format!("{BASE}/nvm-noinstall.zip"), archive.to_vec())
        .with_body(format!("{BASE}/nvm-noinstall.zip.checksum.txt"), format!("{checksum}\n"))
        .with_body(format!("{BASE}/update.exe"), "installer")
}

fn config(retention_days: u32) -> UpgradeConfig {
    UpgradeConfig {
        release_url: RELEASE_URL.to_string(),
        advisory_url: ADVISORY_URL.to_string(),
        backup_retention_days: retention_days,
        watcher_poll_interval_ms: 5,
        watcher_max_wait_secs: 5,
        ..UpgradeConfig::default()
    }
}

/// Run the orchestrator and return the plan it handed to the launcher.
async fn stage(
    install: &Installation,
    transport: StaticTransport,
    config: UpgradeConfig,
) -> (anyhow::Result<UpgradeOutcome>, Vec<WatchPlan>, Vec<StatusEvent>) {
    let launcher = FakeLauncher::default();
    let (tx, mut stream) = status::channel();
    let mut orchestrator = ReplacementOrchestrator::new(
        transport,
        launcher.clone(),
        config,
        install.exe(),
        Version::parse("1.1.12").unwrap(),
        tx,
    )
    .with_error_log(install.temp.path().join("data").join("upgrade-error.log"));

    let result = orchestrator.run_until(std::future::pending()).await;
    (result, launcher.plans(), stream.drain())
}

#[tokio::test]
async fn test_upgrade_replaces_executable_and_schedules_cleanup() {
    let install = Installation::new();
    let archive = release_archive(&install);
    let before = install.snapshot();

    let (result, plans, events) = stage(&install, feed(&archive, &md5_hex(&archive)), config(7)).await;
    assert!(matches!(result.unwrap(), UpgradeOutcome::Launched { ref version, .. } if version == "1.2.0"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    // Until the Watcher runs, only `.update` differs.
    assert_eq!(install.snapshot(), before);
    assert_eq!(plans.len(), 1);

    let scheduler = RecordingScheduler::default();
    let relauncher = RecordingRelauncher::default();
    let mut watcher = Watcher::new(
        plans[0].clone(),
        Box::new(CountdownProbe::new(2)),
        Box::new(scheduler.clone()),
        Box::new(relauncher.clone()),
    );
    watcher.run().await.unwrap();

    assert_eq!(fs::read(install.exe()).unwrap(), b"new binary 1.2.0");
    assert_eq!(fs::read(install.dir.join("elevate.cmd")).unwrap(), b"elevate");
    assert_eq!(fs::read(install.dir.join("LICENSE")).unwrap(), b"MIT");
    assert_eq!(fs::read(install.dir.join("settings.txt")).unwrap(), b"root: C:\\nvm");
    assert!(install.dir.join("v20.11.0").join("node.exe").exists());

    let staging = install.dir.join(STAGING_DIR);
    assert!(!staging.join(PRIMARY_EXECUTABLE).exists());
    assert!(staging.join(BACKUP_ARCHIVE).exists());

    let record = BackupManager::load_record(&staging).unwrap().unwrap();
    let registered = scheduler.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].name, BACKUP_CLEANUP_TASK);
    assert_eq!(registered[0].start_time.as_deref(), Some(BACKUP_CLEANUP_TIME));
    assert!(registered[0].command.contains("cleanup-backup"));
    let earliest = (record.created_at + ChronoDuration::days(7)).with_timezone(&Local).date_naive();
    assert!(registered[0].start_date.unwrap() >= earliest);

    assert_eq!(relauncher.signals(), vec![LaunchSignal::upgrade_notify("1.2.0")]);
}

#[tokio::test]
async fn test_short_retention_is_raised_to_a_week() {
    let install = Installation::new();
    let archive = release_archive(&install);

    let (result, _, _) = stage(&install, feed(&archive, &md5_hex(&archive)), config(1)).await;
    result.unwrap();

    let record = BackupManager::load_record(&install.dir.join(STAGING_DIR)).unwrap().unwrap();
    assert!(record.retention_expiry - record.created_at >= ChronoDuration::days(7));
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_installation_untouched() {
    let install = Installation::new();
    let archive = release_archive(&install);
    let before = install.snapshot();

    let (result, plans, events) =
        stage(&install, feed(&archive, "00000000000000000000000000000000"), config(7)).await;

    let err = result.unwrap_err();
    assert!(matches!(err.downcast_ref::<NvmwError>(), Some(NvmwError::ChecksumMismatch { .. })));
    assert!(plans.is_empty());
    assert_eq!(install.snapshot(), before);
    assert!(!install.dir.join(STAGING_DIR).exists());
    assert!(matches!(events.last(), Some(StatusEvent::Err(_))));

    let log = fs::read_to_string(install.temp.path().join("data").join("upgrade-error.log")).unwrap();
    assert!(log.contains("checksum mismatch"));
}

#[tokio::test]
async fn test_current_release_stops_after_check() {
    let install = Installation::new();
    let transport = StaticTransport::new()
        .with_body(RELEASE_URL, release_json("1.1.12", BASE))
        .with_body(ADVISORY_URL, "{}");
    let before = install.snapshot();

    let launcher = FakeLauncher::default();
    let (tx, mut stream) = status::channel();
    let mut orchestrator = ReplacementOrchestrator::new(
        transport.clone(),
        launcher.clone(),
        config(7),
        install.exe(),
        Version::parse("1.1.12").unwrap(),
        tx,
    );

    let outcome = orchestrator.run_until(std::future::pending()).await.unwrap();
    assert!(matches!(outcome, UpgradeOutcome::UpToDate { .. }));
    assert_eq!(orchestrator.state(), UpgradeState::Done);
    assert!(launcher.plans().is_empty());
    assert_eq!(transport.requests(), vec![RELEASE_URL.to_string(), ADVISORY_URL.to_string()]);
    assert_eq!(install.snapshot(), before);
    assert!(!install.dir.join(STAGING_DIR).exists());

    let events = stream.drain();
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}
