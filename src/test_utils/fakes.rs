//! Recording fakes for the updater's external seams.

use crate::core::NvmwError;
use crate::upgrade::metadata::Transport;
use crate::upgrade::notify::{LaunchSignal, NotificationPayload, Notifier, Relauncher};
use crate::upgrade::scheduler::{ScheduledTask, TaskScheduler};
use crate::upgrade::watcher::{ProcessProbe, WatchPlan, WatcherLauncher};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Serves canned responses by exact URL. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    responses: HashMap<String, (u16, Vec<u8>)>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `200 OK` and `body`.
    #[must_use]
    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.into(), (200, body.into()));
        self
    }

    /// Answer `url` with `status` and an empty body.
    #[must_use]
    pub fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.responses.insert(url.into(), (status, Vec::new()));
        self
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        let (status, body) = self.responses.get(url).cloned().unwrap_or((404, Vec::new()));
        if status != 200 {
            return Err(NvmwError::HttpStatus {
                url: url.to_string(),
                status,
            }
            .into());
        }
        Ok(body)
    }
}

impl Transport for StaticTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.respond(url)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let body = self.respond(url)?;
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }
}

/// Records registrations. `unavailable()` behaves like a host without a
/// task scheduler.
#[derive(Debug, Clone, Default)]
pub struct RecordingScheduler {
    registered: Arc<Mutex<Vec<ScheduledTask>>>,
    unregistered: Arc<Mutex<Vec<String>>>,
    unavailable: bool,
}

impl RecordingScheduler {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn registered(&self) -> Vec<ScheduledTask> {
        self.registered.lock().unwrap().clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.unregistered.lock().unwrap().clone()
    }
}

impl TaskScheduler for RecordingScheduler {
    fn register(&self, task: &ScheduledTask) -> Result<()> {
        if self.unavailable {
            return Err(NvmwError::SchedulerUnavailable.into());
        }
        self.registered.lock().unwrap().push(task.clone());
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<()> {
        if self.unavailable {
            return Err(NvmwError::SchedulerUnavailable.into());
        }
        self.unregistered.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<NotificationPayload> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<()> {
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingRelauncher {
    signals: Arc<Mutex<Vec<LaunchSignal>>>,
}

impl RecordingRelauncher {
    pub fn signals(&self) -> Vec<LaunchSignal> {
        self.signals.lock().unwrap().clone()
    }
}

impl Relauncher for RecordingRelauncher {
    fn relaunch(&self, signal: &LaunchSignal) -> Result<()> {
        self.signals.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

/// Reports the process as running for the first `polls` checks.
#[derive(Debug, Clone)]
pub struct CountdownProbe {
    remaining: Arc<AtomicU32>,
}

impl CountdownProbe {
    pub fn new(polls: u32) -> Self {
        Self {
            remaining: Arc::new(AtomicU32::new(polls)),
        }
    }
}

impl ProcessProbe for CountdownProbe {
    fn is_running(&self, _pid: u32) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Records launch plans instead of starting a process.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    plans: Arc<Mutex<Vec<WatchPlan>>>,
    fail: bool,
}

impl FakeLauncher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn plans(&self) -> Vec<WatchPlan> {
        self.plans.lock().unwrap().clone()
    }
}

impl WatcherLauncher for FakeLauncher {
    fn launch(&self, plan: &WatchPlan) -> Result<u32> {
        if self.fail {
            return Err(NvmwError::WatcherLaunchFailed {
                reason: "launch refused by test".to_string(),
            }
            .into());
        }
        self.plans.lock().unwrap().push(plan.clone());
        Ok(4242)
    }
}
