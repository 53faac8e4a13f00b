//! Cross-platform utilities.
//!
//! - [`fs`] - atomic writes, directory copies, the hidden attribute
//! - [`platform`] - data directories and detached process spawning
//! - [`progress`] - the console spinner

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, copy_dir, ensure_dir, remove_dir_all, set_hidden};
pub use platform::{data_dir, detach, install_dir, is_windows};
pub use progress::ProgressBar;
