//! The update state machine run by `nvmw upgrade`.
//!
//! ```text
//! Idle → CheckingUpdate → Downloading → VerifyingChecksum → Extracting
//!      → BackingUp → Staging → LaunchingWatcher → Done
//! ```
//!
//! Every state before `LaunchingWatcher` may end in `Fatal` (or `Cancelled` on
//! Ctrl-C). In both cases this run's scratch directory and anything it staged
//! are removed, so files outside `.update` are never modified. Once the
//! Watcher has been launched the run cannot be cancelled; the process only
//! reports `Done` and exits so the Watcher can replace the executable.

use crate::constants::{PRIMARY_EXECUTABLE, STAGING_DIR, WATCHER_LOG};
use crate::core::NvmwError;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::installer::PackageInstaller;
use crate::upgrade::metadata::{Transport, UpdateDescriptor, UpdateMetadataFetcher};
use crate::upgrade::status::StatusSender;
use crate::upgrade::verification::ChecksumVerifier;
use crate::upgrade::watcher::{WatchPlan, WatcherLauncher};
use crate::utils::fs::remove_dir_all;
use crate::version::Version;
use anyhow::{Context, Result};
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const SCRATCH_PREFIX: &str = "nvmw-upgrade-";
const ARCHIVE_FILE: &str = "assets.zip";
const EXTRACT_DIR: &str = "assets";
const EXTRAS_DIR: &str = "extras";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Idle,
    CheckingUpdate,
    Downloading,
    VerifyingChecksum,
    Extracting,
    BackingUp,
    Staging,
    LaunchingWatcher,
    Done,
    Fatal,
    Cancelled,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a run ended, short of a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The running version is current.
    UpToDate { current: String },
    /// The Watcher is waiting for this process to exit.
    Launched { version: String, watcher_pid: u32 },
    /// Interrupted before the Watcher was launched.
    Cancelled,
}

/// What this run has created and must remove if it does not reach the Watcher.
#[derive(Debug, Default)]
struct RunArtifacts {
    scratch: Option<TempDir>,
    staging_dir: Option<PathBuf>,
    staging_created: bool,
    staged: Vec<PathBuf>,
    committed: bool,
    /// File work on the blocking pool. It outlives an interrupted run, so it
    /// must finish before anything is removed.
    in_flight: Option<JoinHandle<()>>,
}

impl RunArtifacts {
    /// Run `work` on the blocking pool and wait for its result.
    async fn blocking<R, F>(&mut self, work: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.in_flight = Some(tokio::task::spawn_blocking(move || {
            let _ = tx.send(work());
        }));
        let result = rx.await;
        self.in_flight = None;
        result.map_err(|_| anyhow::anyhow!("file operation ended without a result"))?
    }

    /// Wait for blocking work left behind by an interrupted run.
    async fn settle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            debug!("Waiting for an in-flight file operation to finish");
            if let Err(e) = handle.await {
                warn!("In-flight file operation failed: {}", e);
            }
        }
    }

    fn discard(&mut self) {
        if self.committed {
            return;
        }
        if let Some(staging) = &self.staging_dir {
            if self.staging_created {
                if let Err(e) = remove_dir_all(staging) {
                    warn!("Failed to remove {}: {:#}", staging.display(), e);
                }
            } else {
                for path in &self.staged {
                    let removed = if path.is_dir() {
                        remove_dir_all(path)
                    } else {
                        std::fs::remove_file(path).map_err(Into::into)
                    };
                    if let Err(e) = removed {
                        warn!("Failed to remove {}: {:#}", path.display(), e);
                    }
                }
            }
        }
        if let Some(scratch) = self.scratch.take() {
            debug!("Removing scratch directory {}", scratch.path().display());
            drop(scratch);
        }
    }
}

/// Drives one update of the executable at `target`.
///
/// # Examples
///
/// ```rust,no_run
/// use nvmw_cli::upgrade::config::UpgradeConfig;
/// use nvmw_cli::upgrade::metadata::HttpTransport;
/// use nvmw_cli::upgrade::orchestrator::ReplacementOrchestrator;
/// use nvmw_cli::upgrade::status;
/// use nvmw_cli::upgrade::watcher::DetachedLauncher;
/// use nvmw_cli::version::Version;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpgradeConfig::default();
/// let (tx, _stream) = status::channel();
/// let mut orchestrator = ReplacementOrchestrator::new(
///     HttpTransport::new(&config)?,
///     DetachedLauncher::default(),
///     config,
///     std::env::current_exe()?,
///     Version::parse(env!("CARGO_PKG_VERSION"))?,
///     tx,
/// );
/// let outcome = orchestrator.run().await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct ReplacementOrchestrator<T, L> {
    fetcher: UpdateMetadataFetcher<T>,
    launcher: L,
    config: UpgradeConfig,
    target: PathBuf,
    install_dir: PathBuf,
    current: Version,
    parent_pid: u32,
    status: StatusSender,
    error_log: Option<PathBuf>,
    target_version: Option<String>,
    history: Vec<UpgradeState>,
}

impl<T: Transport, L: WatcherLauncher> ReplacementOrchestrator<T, L> {
    pub fn new(
        transport: T,
        launcher: L,
        config: UpgradeConfig,
        target: PathBuf,
        current: Version,
        status: StatusSender,
    ) -> Self {
        let install_dir = target.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            fetcher: UpdateMetadataFetcher::new(transport, &config),
            launcher,
            config,
            target,
            install_dir,
            current,
            parent_pid: std::process::id(),
            status,
            error_log: None,
            target_version: None,
            history: vec![UpgradeState::Idle],
        }
    }

    /// Append fatal errors to `path`.
    #[must_use]
    pub fn with_error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    /// PID the Watcher waits on. Defaults to this process.
    #[must_use]
    pub const fn with_parent_pid(mut self, pid: u32) -> Self {
        self.parent_pid = pid;
        self
    }

    #[must_use]
    pub fn state(&self) -> UpgradeState {
        self.history.last().copied().unwrap_or(UpgradeState::Idle)
    }

    #[must_use]
    pub fn history(&self) -> &[UpgradeState] {
        &self.history
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.install_dir.join(STAGING_DIR)
    }

    fn enter(&mut self, state: UpgradeState) {
        info!("Upgrade: {} -> {}", self.state(), state);
        self.history.push(state);
    }

    /// Fetch metadata only. No status events, no side effects.
    pub async fn check(&mut self) -> Result<UpdateDescriptor> {
        self.enter(UpgradeState::CheckingUpdate);
        let descriptor = self.fetcher.fetch().await?;
        self.target_version = Some(descriptor.target_version.to_string());
        Ok(descriptor)
    }

    /// Run until done, failed, or interrupted with Ctrl-C.
    pub async fn run(&mut self) -> Result<UpgradeOutcome> {
        self.run_until(interrupted()).await
    }

    /// Run until done or failed, or until `cancel` completes.
    ///
    /// Fatal errors are reported as an `Err` status event, appended to the
    /// error log and returned.
    pub async fn run_until<F>(&mut self, cancel: F) -> Result<UpgradeOutcome>
    where
        F: Future<Output = ()>,
    {
        let mut artifacts = RunArtifacts::default();

        let result = tokio::select! {
            biased;
            () = cancel => None,
            result = self.execute(&mut artifacts) => Some(result),
        };

        match result {
            Some(Ok(outcome)) => Ok(outcome),
            None => {
                warn!("Upgrade interrupted in state {}", self.state());
                artifacts.settle().await;
                artifacts.discard();
                self.enter(UpgradeState::Cancelled);
                self.status.cancel(self.target_version.clone());
                Ok(UpgradeOutcome::Cancelled)
            }
            Some(Err(e)) => {
                error!("Upgrade failed in state {}: {:#}", self.state(), e);
                artifacts.discard();
                self.enter(UpgradeState::Fatal);
                self.record_failure(&e);
                self.status.err(format!("{e:#}"));
                Err(e)
            }
        }
    }

    async fn execute(&mut self, artifacts: &mut RunArtifacts) -> Result<UpgradeOutcome> {
        self.enter(UpgradeState::CheckingUpdate);
        self.status.text("Checking for updates...");
        let descriptor = self.fetcher.fetch().await?;
        self.target_version = Some(descriptor.target_version.to_string());

        for warning in &descriptor.global_warnings {
            self.status.warn(warning.clone());
        }

        let (version, newer) = descriptor.available(&self.current);
        if !newer {
            self.enter(UpgradeState::Done);
            self.status.done("nvm is up to date", None);
            return Ok(UpgradeOutcome::UpToDate {
                current: self.current.to_string(),
            });
        }

        for warning in &descriptor.version_warnings {
            self.status.warn(warning.clone());
        }
        self.status.text(format!("Upgrading nvm {} to {}", self.current, version));

        self.enter(UpgradeState::Downloading);
        let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
        let scratch_path = scratch.path().to_path_buf();
        artifacts.scratch = Some(scratch);

        let archive = scratch_path.join(ARCHIVE_FILE);
        self.status.text(format!("Downloading {}", descriptor.archive_url));
        let bytes = self
            .fetcher
            .transport()
            .download(&descriptor.archive_url, &archive)
            .await
            .context("Failed to download update")?;
        debug!("Archive downloaded ({} bytes)", bytes);

        let extras = self.download_extras(&descriptor, &scratch_path).await?;

        self.enter(UpgradeState::VerifyingChecksum);
        self.status.text("Verifying download");
        ChecksumVerifier::verify_from_sidecar(
            self.fetcher.transport(),
            &archive,
            &descriptor.checksum_url(),
        )
        .await?;

        self.enter(UpgradeState::Extracting);
        self.status.text("Extracting update");
        let extracted = scratch_path.join(EXTRACT_DIR);
        let report = {
            let archive = archive.clone();
            let extracted = extracted.clone();
            artifacts
                .blocking(move || PackageInstaller::extract_blocking(&archive, &extracted))
                .await?
        };
        for skipped in &report.skipped {
            self.status.warn(format!("Skipped unsafe archive entry: {skipped}"));
        }
        if self.config.verbose {
            for file in &report.files {
                self.status.text(format!("  {}", file.display()));
            }
        }
        PackageInstaller::find_executable(&extracted)?;

        self.enter(UpgradeState::BackingUp);
        self.status.text("Backing up current installation");
        let staging = self.staging_dir();
        artifacts.staging_created = !staging.exists();
        artifacts.staging_dir = Some(staging.clone());
        let backup = BackupManager::new(&self.install_dir, &self.config);
        let record = {
            let backup = backup.clone();
            artifacts.blocking(move || backup.create_blocking(chrono::Utc::now())).await?
        };
        self.status.text(format!("Backup saved to {}", record.archive_path.display()));

        self.enter(UpgradeState::Staging);
        self.status.text("Staging update");
        let staged = {
            let extracted = extracted.clone();
            let staging = staging.clone();
            artifacts.blocking(move || PackageInstaller::stage(&extracted, &staging)).await?
        };
        artifacts.staged.push(staged.executable.clone());
        artifacts.staged.push(staged.payload_dir.clone());
        for extra in extras {
            let path = PackageInstaller::stage_asset(&extra, &staging)?;
            artifacts.staged.push(path);
        }

        if self.config.verbose {
            self.self_test(&staged.executable).await;
        }

        self.enter(UpgradeState::LaunchingWatcher);
        let plan = WatchPlan {
            parent_pid: self.parent_pid,
            staged: staged.executable,
            target: self.target.clone(),
            payload_dir: Some(staged.payload_dir),
            backup_record: Some(backup.record_path()),
            log_file: staging.join(WATCHER_LOG),
            version: version.clone(),
            poll_interval: self.config.poll_interval(),
            max_wait: self.config.max_wait(),
        };
        let watcher_pid = self.launcher.launch(&plan)?;
        artifacts.committed = true;

        self.enter(UpgradeState::Done);
        self.status.done("restarting app...", Some(version.clone()));
        Ok(UpgradeOutcome::Launched {
            version,
            watcher_pid,
        })
    }

    async fn download_extras(
        &self,
        descriptor: &UpdateDescriptor,
        scratch: &Path,
    ) -> Result<Vec<PathBuf>> {
        if descriptor.extra_assets.is_empty() {
            return Ok(Vec::new());
        }

        let dir = scratch.join(EXTRAS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let mut files = Vec::new();
        for url in &descriptor.extra_assets {
            let name = url.rsplit('/').next().filter(|name| !name.is_empty()).ok_or_else(|| {
                NvmwError::InvalidRelease {
                    reason: format!("asset URL has no file name: {url}"),
                }
            })?;
            let dest = dir.join(name);
            self.status.text(format!("Downloading {url}"));
            self.fetcher
                .transport()
                .download(url, &dest)
                .await
                .with_context(|| format!("Failed to download {name}"))?;
            files.push(dest);
        }
        Ok(files)
    }

    /// Run the staged binary's `version` command and relay its output.
    async fn self_test(&self, exe: &Path) {
        let child = tokio::process::Command::new(exe)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                self.status.warn(format!("Could not run staged {PRIMARY_EXECUTABLE}: {e}"));
                return;
            }
        };

        let relays: Vec<_> = [
            child.stdout.take().map(|out| tokio::spawn(relay(out, self.status.clone()))),
            child.stderr.take().map(|err| tokio::spawn(relay(err, self.status.clone()))),
        ]
        .into_iter()
        .flatten()
        .collect();

        match child.wait().await {
            Ok(status) if status.success() => {}
            Ok(status) => {
                self.status.warn(format!("Staged binary self-test exited with {status}"));
            }
            Err(e) => {
                self.status.warn(format!("Staged binary self-test failed: {e}"));
            }
        }
        for handle in relays {
            let _ = handle.await;
        }
    }

    fn record_failure(&self, error: &anyhow::Error) {
        let Some(path) = &self.error_log else {
            return;
        };
        let line = format!(
            "[{}] upgrade from {} failed: {:#}\n",
            chrono::Utc::now().to_rfc3339(),
            self.current,
            error
        );
        let written = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::OpenOptions::new().create(true).append(true).open(path))
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = written {
            warn!("Could not write {}: {}", path.display(), e);
        }
    }
}

async fn relay<R>(reader: R, status: StatusSender)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        status.text(line);
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Unable to listen for Ctrl-C; the upgrade cannot be interrupted");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BACKUP_ARCHIVE, PAYLOAD_DIR};
    use crate::test_utils::{FakeLauncher, StaticTransport, md5_hex, release_json, write_zip};
    use crate::upgrade::status::{self, StatusEvent};
    use std::fs;
    use tempfile::TempDir;

    const BASE: &str = "https://dl.test";
    const RELEASE_URL: &str = "https://feed.test/latest";
    const ADVISORY_URL: &str = "https://feed.test/alerts";

    struct Setup {
        temp: TempDir,
        install: PathBuf,
        archive: Vec<u8>,
    }

    impl Setup {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let install = temp.path().join("nvm");
            fs::create_dir_all(&install).unwrap();
            fs::write(install.join(PRIMARY_EXECUTABLE), b"old binary").unwrap();
            fs::write(install.join("settings.txt"), b"root: C:\\nvm").unwrap();

            let archive_path = temp.path().join("release.zip");
            write_zip(&archive_path, &[(PRIMARY_EXECUTABLE, "new binary"), ("elevate.cmd", "cmd")])
                .unwrap();
            let archive = fs::read(&archive_path).unwrap();
            Self {
                temp,
                install,
                archive,
            }
        }

        fn transport(&self, version: &str, checksum: &str) -> StaticTransport {
            StaticTransport::new()
                .with_body(RELEASE_URL, release_json(version, BASE))
                .with_body(
                    ADVISORY_URL,
                    format!(r#"{{"all":[{{"message":"global"}}],"{version}":[{{"message":"specific"}}]}}"#),
                )
                .with_body(format!("{BASE}/nvm-noinstall.zip"), self.archive.clone())
                .with_body(format!("{BASE}/nvm-noinstall.zip.checksum.txt"), checksum.to_string())
                .with_body(format!("{BASE}/update.exe"), "installer")
        }

        fn config(&self) -> UpgradeConfig {
            UpgradeConfig {
                release_url: RELEASE_URL.to_string(),
                advisory_url: ADVISORY_URL.to_string(),
                ..UpgradeConfig::default()
            }
        }

        fn orchestrator(
            &self,
            transport: StaticTransport,
            launcher: FakeLauncher,
        ) -> (ReplacementOrchestrator<StaticTransport, FakeLauncher>, status::StatusStream) {
            let (tx, stream) = status::channel();
            let orchestrator = ReplacementOrchestrator::new(
                transport,
                launcher,
                self.config(),
                self.install.join(PRIMARY_EXECUTABLE),
                Version::parse("1.1.12").unwrap(),
                tx,
            )
            .with_error_log(self.temp.path().join("data").join("upgrade-error.log"));
            (orchestrator, stream)
        }

        fn install_untouched(&self) {
            let names: Vec<_> = fs::read_dir(&self.install)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            assert_eq!(names.len(), 2, "unexpected files in install dir: {names:?}");
            assert_eq!(fs::read(self.install.join(PRIMARY_EXECUTABLE)).unwrap(), b"old binary");
        }
    }

    #[tokio::test]
    async fn test_full_cycle_stages_and_launches() {
        let setup = Setup::new();
        let checksum = md5_hex(&setup.archive);
        let launcher = FakeLauncher::default();
        let (mut orchestrator, mut stream) =
            setup.orchestrator(setup.transport("1.2.0", &checksum), launcher.clone());

        let outcome = orchestrator.run_until(std::future::pending()).await.unwrap();
        assert_eq!(
            outcome,
            UpgradeOutcome::Launched {
                version: "1.2.0".to_string(),
                watcher_pid: 4242
            }
        );
        assert_eq!(
            orchestrator.history(),
            &[
                UpgradeState::Idle,
                UpgradeState::CheckingUpdate,
                UpgradeState::Downloading,
                UpgradeState::VerifyingChecksum,
                UpgradeState::Extracting,
                UpgradeState::BackingUp,
                UpgradeState::Staging,
                UpgradeState::LaunchingWatcher,
                UpgradeState::Done,
            ]
        );

        let staging = setup.install.join(STAGING_DIR);
        assert_eq!(fs::read(staging.join(PRIMARY_EXECUTABLE)).unwrap(), b"new binary");
        assert!(staging.join(PAYLOAD_DIR).join("elevate.cmd").exists());
        assert!(staging.join("update.exe").exists());
        assert!(staging.join(BACKUP_ARCHIVE).exists());
        assert_eq!(fs::read(setup.install.join(PRIMARY_EXECUTABLE)).unwrap(), b"old binary");

        let plans = launcher.plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].target, setup.install.join(PRIMARY_EXECUTABLE));
        assert_eq!(plans[0].staged, staging.join(PRIMARY_EXECUTABLE));
        assert_eq!(plans[0].version, "1.2.0");

        let events = stream.drain();
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(
            events.last().unwrap(),
            &StatusEvent::Done {
                message: "restarting app...".to_string(),
                applied: Some("1.2.0".to_string())
            }
        );
        let warnings: Vec<_> =
            events.iter().filter(|e| matches!(e, StatusEvent::Warn(_))).cloned().collect();
        assert_eq!(
            warnings,
            vec![StatusEvent::Warn("global".to_string()), StatusEvent::Warn("specific".to_string())]
        );
    }

    #[tokio::test]
    async fn test_up_to_date_has_no_side_effects() {
        let setup = Setup::new();
        let launcher = FakeLauncher::default();
        let transport = setup.transport("1.1.12", "unused");
        let (mut orchestrator, mut stream) = setup.orchestrator(transport.clone(), launcher.clone());

        let outcome = orchestrator.run_until(std::future::pending()).await.unwrap();
        assert_eq!(
            outcome,
            UpgradeOutcome::UpToDate {
                current: "1.1.12".to_string()
            }
        );
        setup.install_untouched();
        assert!(launcher.plans().is_empty());
        assert_eq!(transport.requests(), vec![RELEASE_URL, ADVISORY_URL]);

        let events = stream.drain();
        assert!(events.contains(&StatusEvent::Warn("global".to_string())));
        assert!(!events.contains(&StatusEvent::Warn("specific".to_string())));
        assert_eq!(
            events.last().unwrap(),
            &StatusEvent::Done {
                message: "nvm is up to date".to_string(),
                applied: None
            }
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_leaves_install_untouched() {
        let setup = Setup::new();
        let launcher = FakeLauncher::default();
        let (mut orchestrator, mut stream) = setup
            .orchestrator(setup.transport("1.2.0", "00000000000000000000000000000000"), launcher.clone());

        let err = orchestrator.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NvmwError>(),
            Some(NvmwError::ChecksumMismatch { .. })
        ));
        assert_eq!(orchestrator.state(), UpgradeState::Fatal);
        assert!(!orchestrator.history().contains(&UpgradeState::Extracting));
        setup.install_untouched();
        assert!(launcher.plans().is_empty());

        let events = stream.drain();
        assert!(matches!(events.last(), Some(StatusEvent::Err(msg)) if msg.contains("checksum mismatch")));

        let log = fs::read_to_string(setup.temp.path().join("data").join("upgrade-error.log")).unwrap();
        assert!(log.contains("checksum mismatch"));
    }

    #[tokio::test]
    async fn test_launch_failure_removes_staging() {
        let setup = Setup::new();
        let checksum = md5_hex(&setup.archive);
        let (mut orchestrator, mut stream) =
            setup.orchestrator(setup.transport("1.2.0", &checksum), FakeLauncher::failing());

        let err = orchestrator.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NvmwError>(),
            Some(NvmwError::WatcherLaunchFailed { .. })
        ));
        setup.install_untouched();
        assert_eq!(stream.drain().iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_download_failure_is_fatal() {
        let setup = Setup::new();
        let transport = StaticTransport::new()
            .with_body(RELEASE_URL, release_json("1.2.0", BASE))
            .with_body(ADVISORY_URL, "{}")
            .with_status(format!("{BASE}/nvm-noinstall.zip"), 503);
        let (mut orchestrator, _stream) = setup.orchestrator(transport, FakeLauncher::default());

        let err = orchestrator.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NvmwError>(),
            Some(NvmwError::HttpStatus { status: 503, .. })
        ));
        assert_eq!(
            orchestrator.history()[orchestrator.history().len() - 2],
            UpgradeState::Downloading
        );
        setup.install_untouched();
    }

    #[tokio::test]
    async fn test_cancel_before_launch() {
        let setup = Setup::new();
        let checksum = md5_hex(&setup.archive);
        let launcher = FakeLauncher::default();
        let (mut orchestrator, mut stream) =
            setup.orchestrator(setup.transport("1.2.0", &checksum), launcher.clone());

        let outcome = orchestrator.run_until(std::future::ready(())).await.unwrap();
        assert_eq!(outcome, UpgradeOutcome::Cancelled);
        assert_eq!(orchestrator.state(), UpgradeState::Cancelled);
        setup.install_untouched();
        assert!(launcher.plans().is_empty());
        assert_eq!(stream.drain(), vec![StatusEvent::Cancel { version: None }]);
    }

    /// Cancel once `step` is announced, while its file work is still running.
    async fn cancel_during(step: &str) {
        let setup = Setup::new();
        let checksum = md5_hex(&setup.archive);
        let launcher = FakeLauncher::default();
        let (mut orchestrator, mut stream) =
            setup.orchestrator(setup.transport("1.2.0", &checksum), launcher.clone());

        let announced = StatusEvent::Text(step.to_string());
        let cancel = async {
            while let Some(event) = stream.recv().await {
                if event == announced {
                    break;
                }
            }
        };
        let outcome = orchestrator.run_until(cancel).await.unwrap();

        assert_eq!(outcome, UpgradeOutcome::Cancelled);
        assert_eq!(orchestrator.state(), UpgradeState::Cancelled);
        assert!(!setup.install.join(STAGING_DIR).exists());
        setup.install_untouched();
        assert!(launcher.plans().is_empty());
        assert_eq!(
            stream.drain().last(),
            Some(&StatusEvent::Cancel {
                version: Some("1.2.0".to_string())
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_while_backing_up_removes_staging() {
        cancel_during("Backing up current installation").await;
    }

    #[tokio::test]
    async fn test_cancel_while_staging_removes_staging() {
        cancel_during("Staging update").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_self_test_failure_is_a_warning() {
        use std::os::unix::fs::PermissionsExt;

        let setup = Setup::new();
        let script = setup.temp.path().join("staged-nvm");
        fs::write(&script, "#!/bin/sh\necho 'nvm 1.2.0'\nexit 3\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let (orchestrator, mut stream) =
            setup.orchestrator(StaticTransport::new(), FakeLauncher::default());
        orchestrator.self_test(&script).await;

        let events = stream.drain();
        assert!(events.contains(&StatusEvent::Text("nvm 1.2.0".to_string())));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, StatusEvent::Warn(msg) if msg.contains("exited with"))),
            "unexpected events: {events:?}"
        );
        assert!(!events.iter().any(StatusEvent::is_terminal));
    }

    #[tokio::test]
    async fn test_traversal_only_archive_is_fatal() {
        let setup = Setup::new();
        let evil_path = setup.temp.path().join("evil.zip");
        write_zip(&evil_path, &[("../evil.exe", "evil")]).unwrap();
        let evil = fs::read(&evil_path).unwrap();

        let transport = StaticTransport::new()
            .with_body(RELEASE_URL, release_json("1.2.0", BASE))
            .with_body(ADVISORY_URL, "{}")
            .with_body(format!("{BASE}/nvm-noinstall.zip"), evil.clone())
            .with_body(format!("{BASE}/nvm-noinstall.zip.checksum.txt"), md5_hex(&evil))
            .with_body(format!("{BASE}/update.exe"), "installer");
        let (mut orchestrator, _stream) = setup.orchestrator(transport, FakeLauncher::default());

        let err = orchestrator.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<NvmwError>(), Some(NvmwError::UnsafeArchive { .. })));
        assert!(!orchestrator.history().contains(&UpgradeState::BackingUp));
        setup.install_untouched();
        assert!(!setup.temp.path().join("evil.exe").exists());
    }
}
