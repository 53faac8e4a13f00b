//! Self-update engine for nvmw.
//!
//! A running Windows executable cannot overwrite itself, so an update is split
//! across two processes:
//!
//! - **[`ReplacementOrchestrator`]** runs inside `nvmw upgrade`. It fetches the
//!   release descriptor, downloads and verifies the archive, extracts it into a
//!   scratch directory, snapshots the installation and stages the new files in
//!   the hidden `.update` directory. It then launches the Watcher and exits.
//! - **[`watcher::Watcher`]** runs from a scratch copy of the binary. It waits
//!   for the orchestrator's process to exit, swaps the staged executable into
//!   place, applies the payload, schedules backup cleanup and relaunches the
//!   application.
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Check
//!    ├── Fetch the latest release document
//!    └── Merge advisory warnings ("all" + target version)
//!
//! 2. Prepare (nothing outside .update is touched)
//!    ├── Download archive and secondary assets to a scratch dir
//!    ├── Verify the MD5 sidecar
//!    ├── Extract, skipping unsafe entry names
//!    ├── Snapshot the installation into .update/backup.zip
//!    └── Stage the executable and payload in .update
//!
//! 3. Hand-off
//!    ├── Launch the detached Watcher
//!    └── Report Done and exit
//!
//! 4. Swap (Watcher)
//!    ├── Wait for the parent PID to exit
//!    ├── Copy the staged executable over the target and verify it
//!    ├── Apply the payload
//!    ├── Schedule the backup cleanup task
//!    └── Relaunch via the nvm:// protocol
//! ```
//!
//! Progress is reported as [`status::StatusEvent`]s on a channel. The CLI
//! renders them on the console or forwards them as desktop notifications.
//!
//! Periodic checks are registered with the system task scheduler through
//! [`scheduler`], and [`notices`] records when each channel last notified the
//! user.

pub mod backup;
pub mod config;
pub mod installer;
pub mod metadata;
pub mod notices;
pub mod notify;
/// The `nvmw upgrade` state machine.
pub mod orchestrator;
pub mod scheduler;
pub mod status;
/// Download verification against published MD5 sidecars.
pub mod verification;
/// Executable swap performed after the updating process has exited.
pub mod watcher;

pub use orchestrator::{ReplacementOrchestrator, UpgradeOutcome, UpgradeState};
pub use verification::ChecksumVerifier;
pub use watcher::Watcher;
