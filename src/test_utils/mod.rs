//! Test utilities for nvmw
//!
//! In-memory stand-ins for everything the updater talks to outside the
//! process, so a whole update cycle can run offline inside a temp directory:
//!
//! - [`StaticTransport`] serves canned HTTP responses
//! - [`RecordingScheduler`], [`RecordingNotifier`], [`RecordingRelauncher`] and
//!   [`FakeLauncher`] record what they were asked to do
//! - [`CountdownProbe`] reports a parent process that exits after N polls
//! - [`fixtures`] builds release archives and feed documents
//!
//! # Example
//!
//! ```rust,no_run
//! use nvmw_cli::test_utils::StaticTransport;
//!
//! let transport = StaticTransport::new()
//!     .with_body("https://feed.test/latest", r#"{"name":"1.2.0","assets":[]}"#)
//!     .with_status("https://feed.test/alerts", 500);
//! ```

pub mod fakes;
pub mod fixtures;

pub use fakes::{
    CountdownProbe, FakeLauncher, RecordingNotifier, RecordingRelauncher, RecordingScheduler,
    StaticTransport,
};
pub use fixtures::{md5_hex, release_json, write_zip};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` if given, otherwise
/// `RUST_LOG`; with neither, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
