//! Desktop notifications and the relaunch message.
//!
//! Rendering notifications is delegated to a helper executable shipped next to
//! `nvm.exe`; this module only builds the payload and hands it over. The
//! relaunch message is a one-shot [`LaunchSignal`] rendered as an `nvm://`
//! URI and opened through the OS protocol handler.

use crate::constants::{LAUNCH_PROTOCOL, NOTIFICATION_APP_ID, NOTIFIER_EXECUTABLE};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub uri: String,
}

impl NotificationAction {
    /// A button that opens an `nvm://` URI.
    pub fn protocol(label: impl Into<String>, signal: &LaunchSignal) -> Self {
        Self {
            kind: "protocol".to_string(),
            label: label.into(),
            uri: signal.to_uri(),
        }
    }
}

/// Message handed to the notifier helper as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub app_id: String,
    pub title: String,
    pub message: String,
    pub icon: String,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    /// `short` or `long`.
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            app_id: NOTIFICATION_APP_ID.to_string(),
            title: title.into(),
            message: message.into(),
            icon: "nvm.png".to_string(),
            actions: Vec::new(),
            duration: "short".to_string(),
            link: None,
        }
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn long(mut self) -> Self {
        self.duration = "long".to_string();
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Shows notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, payload: &NotificationPayload) -> impl Future<Output = Result<()>> + Send;
}

/// Runs the external notifier helper as `<helper> notify <json>`.
///
/// The helper's standard output and error are relayed line by line into the
/// log while it runs.
#[derive(Debug, Clone)]
pub struct BridgeNotifier {
    helper: PathBuf,
}

impl BridgeNotifier {
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    /// The helper installed next to `install_dir`'s executable.
    pub fn in_dir(install_dir: &Path) -> Self {
        Self::new(install_dir.join(NOTIFIER_EXECUTABLE))
    }

    pub fn helper(&self) -> &Path {
        &self.helper
    }
}

async fn relay_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "nvmw::notifier", "[{}] {}", stream, line);
    }
}

impl Notifier for BridgeNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<()> {
        if !self.helper.is_file() {
            bail!("Notifier helper not found at {}", self.helper.display());
        }

        let json = serde_json::to_string(payload)?;
        debug!("Sending notification '{}'", payload.title);

        let mut child = Command::new(&self.helper)
            .arg("notify")
            .arg(json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.helper.display()))?;

        let stdout = child.stdout.take().map(|out| tokio::spawn(relay_lines(out, "stdout")));
        let stderr = child.stderr.take().map(|err| tokio::spawn(relay_lines(err, "stderr")));

        let status = child.wait().await?;
        for relay in [stdout, stderr].into_iter().flatten() {
            let _ = relay.await;
        }

        if !status.success() {
            bail!("Notifier helper exited with {status}");
        }
        Ok(())
    }
}

/// What a launch URI asks the running shell to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    /// Start an upgrade to the given version.
    Upgrade,
    /// An upgrade to the given version just completed.
    UpgradeNotify,
}

impl LaunchAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::UpgradeNotify => "upgrade_notify",
        }
    }
}

/// One-shot message delivered through the `nvm://launch` protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSignal {
    pub action: LaunchAction,
    pub version: String,
}

impl LaunchSignal {
    pub fn upgrade(version: impl Into<String>) -> Self {
        Self {
            action: LaunchAction::Upgrade,
            version: version.into(),
        }
    }

    pub fn upgrade_notify(version: impl Into<String>) -> Self {
        Self {
            action: LaunchAction::UpgradeNotify,
            version: version.into(),
        }
    }

    #[must_use]
    pub fn to_uri(&self) -> String {
        format!("{LAUNCH_PROTOCOL}?action={}&version={}", self.action.as_str(), self.version)
    }
}

impl fmt::Display for LaunchSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Delivers a [`LaunchSignal`].
pub trait Relauncher: Send + Sync {
    fn relaunch(&self, signal: &LaunchSignal) -> Result<()>;
}

/// Opens the launch URI with the registered protocol handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct UriRelauncher;

impl Relauncher for UriRelauncher {
    fn relaunch(&self, signal: &LaunchSignal) -> Result<()> {
        let uri = signal.to_uri();
        info!("Signalling relaunch via {}", uri);
        open::that_detached(&uri).with_context(|| format!("Failed to open {uri}"))
    }
}

/// Log-only relauncher for hosts without the protocol handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRelauncher;

impl Relauncher for LogRelauncher {
    fn relaunch(&self, signal: &LaunchSignal) -> Result<()> {
        warn!("No launch protocol handler on this platform; skipping {}", signal);
        Ok(())
    }
}
