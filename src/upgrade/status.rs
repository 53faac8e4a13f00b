//! Status events flowing from the orchestrator to one observer.
//!
//! The orchestrator and its helper tasks push [`StatusEvent`]s through a
//! [`StatusSender`]; a single [`StatusStream`] drains them in arrival order into
//! a [`StatusObserver`]. Two observers exist: [`ConsoleReporter`] for the
//! terminal and [`NotificationForwarder`] for desktop notifications.
//!
//! At most one terminal event (`Err`, `Done`, `Cancel`) is ever delivered. The
//! sender enforces this: once a terminal event has been sent, later sends are
//! dropped with a warning and reported as rejected.

use crate::upgrade::notify::{LaunchSignal, NotificationAction, NotificationPayload, Notifier};
use crate::utils::progress::ProgressBar;
use colored::Colorize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Progress line.
    Text(String),
    /// Advisory or recoverable problem.
    Warn(String),
    /// Fatal error. Terminal.
    Err(String),
    /// Finished. `applied` carries the new version when an update was staged.
    Done { message: String, applied: Option<String> },
    /// Interrupted by the user. Terminal.
    Cancel { version: Option<String> },
}

impl StatusEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Err(_) | Self::Done { .. } | Self::Cancel { .. })
    }
}

/// Producer half of the status stream. Cheap to clone; clones share the
/// terminal-event guard.
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::UnboundedSender<StatusEvent>,
    finished: Arc<AtomicBool>,
}

/// Consumer half of the status stream.
#[derive(Debug)]
pub struct StatusStream {
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

/// Create a connected sender and stream.
pub fn channel() -> (StatusSender, StatusStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StatusSender {
            tx,
            finished: Arc::new(AtomicBool::new(false)),
        },
        StatusStream {
            rx,
        },
    )
}

impl StatusSender {
    /// Queue an event. Returns `false` if it was rejected because a terminal
    /// event was already sent or the stream is gone.
    pub fn send(&self, event: StatusEvent) -> bool {
        if event.is_terminal() {
            if self.finished.swap(true, Ordering::SeqCst) {
                warn!("Dropping status event after terminal event: {:?}", event);
                return false;
            }
        } else if self.finished.load(Ordering::SeqCst) {
            warn!("Dropping status event after terminal event: {:?}", event);
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn text(&self, message: impl Into<String>) -> bool {
        self.send(StatusEvent::Text(message.into()))
    }

    pub fn warn(&self, message: impl Into<String>) -> bool {
        self.send(StatusEvent::Warn(message.into()))
    }

    pub fn err(&self, cause: impl Into<String>) -> bool {
        self.send(StatusEvent::Err(cause.into()))
    }

    pub fn done(&self, message: impl Into<String>, applied: Option<String>) -> bool {
        self.send(StatusEvent::Done {
            message: message.into(),
            applied,
        })
    }

    pub fn cancel(&self, version: Option<String>) -> bool {
        self.send(StatusEvent::Cancel {
            version,
        })
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl StatusStream {
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// Feed every event to `observer` until a terminal event arrives or all
    /// senders are dropped. Returns the terminal event, if any.
    pub async fn run<O: StatusObserver>(mut self, observer: &mut O) -> Option<StatusEvent> {
        while let Some(event) = self.rx.recv().await {
            observer.on_event(&event).await;
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    /// Drain everything currently queued without waiting.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Receives status events in order.
///
/// Observers cannot fail the update; problems showing an event are theirs to
/// log.
pub trait StatusObserver: Send {
    fn on_event(&mut self, event: &StatusEvent) -> impl Future<Output = ()> + Send;
}

/// Line-oriented terminal output.
pub struct ConsoleReporter {
    spinner: ProgressBar,
}

impl ConsoleReporter {
    /// `show_spinner` is false for `--no-progress` and `--quiet`.
    pub fn new(show_spinner: bool) -> Self {
        let spinner = if show_spinner { ProgressBar::new_spinner() } else { ProgressBar::hidden() };
        Self {
            spinner,
        }
    }

    /// The line printed for `event`, if any.
    #[must_use]
    pub fn render(event: &StatusEvent) -> Option<String> {
        match event {
            StatusEvent::Text(text) => Some(text.clone()),
            StatusEvent::Warn(text) => Some(format!("⚠️  {}", text.yellow())),
            StatusEvent::Err(cause) => Some(format!("{} {}", "Error:".red().bold(), cause.red())),
            StatusEvent::Done { message, applied: Some(version) } => Some(format!(
                "{} {}\n{}",
                "✓".green(),
                format!("Upgrade complete: nvm {version}").green().bold(),
                message
            )),
            StatusEvent::Done { message, applied: None } => Some(message.green().to_string()),
            StatusEvent::Cancel { .. } => Some("Installation canceled by user".yellow().to_string()),
        }
    }
}

impl StatusObserver for ConsoleReporter {
    async fn on_event(&mut self, event: &StatusEvent) {
        if let StatusEvent::Text(text) = event {
            self.spinner.set_message(text.clone());
        }
        if event.is_terminal() {
            self.spinner.finish_and_clear();
        }
        if let Some(line) = Self::render(event) {
            match event {
                StatusEvent::Err(_) | StatusEvent::Warn(_) => self.spinner.suspend(|| eprintln!("{line}")),
                _ => self.spinner.suspend(|| println!("{line}")),
            }
        }
    }
}

/// Renders status events as desktop notifications.
///
/// Progress lines are only logged; warnings and terminal events become
/// notifications. A failing notifier is logged and otherwise ignored.
pub struct NotificationForwarder<N> {
    notifier: N,
    target_version: Option<String>,
}

impl<N: Notifier> NotificationForwarder<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            target_version: None,
        }
    }

    /// Version offered by the "Install Again" action after a cancel.
    #[must_use]
    pub fn with_target_version(mut self, version: Option<String>) -> Self {
        self.target_version = version;
        self
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The notification shown for `event`, if any.
    #[must_use]
    pub fn payload_for(&self, event: &StatusEvent) -> Option<NotificationPayload> {
        match event {
            StatusEvent::Text(_) => None,
            StatusEvent::Warn(text) => {
                Some(NotificationPayload::new("NVM for Windows", text.clone()).with_icon("nvm.png"))
            }
            StatusEvent::Err(cause) => Some(
                NotificationPayload::new("Installation Error", cause.clone())
                    .with_icon("error.png")
                    .long(),
            ),
            StatusEvent::Cancel { version } => {
                let mut payload = NotificationPayload::new(
                    "Installation Canceled",
                    "The update was canceled and nothing was changed.",
                );
                if let Some(version) = version.as_ref().or(self.target_version.as_ref()) {
                    payload = payload.with_action(NotificationAction::protocol(
                        "Install Again",
                        &LaunchSignal::upgrade(version.clone()),
                    ));
                }
                Some(payload)
            }
            StatusEvent::Done { applied: Some(version), .. } => Some(NotificationPayload::new(
                "Upgrade Complete",
                format!("Now running version {version}."),
            )),
            StatusEvent::Done { message, applied: None } => {
                Some(NotificationPayload::new("NVM for Windows", message.clone()))
            }
        }
    }
}

impl<N: Notifier> StatusObserver for NotificationForwarder<N> {
    async fn on_event(&mut self, event: &StatusEvent) {
        if let StatusEvent::Text(text) = event {
            debug!("{}", text);
        }
        let Some(payload) = self.payload_for(event) else {
            return;
        };
        if let Err(e) = self.notifier.notify(&payload).await {
            warn!("Could not show notification '{}': {:#}", payload.title, e);
        }
    }
}
