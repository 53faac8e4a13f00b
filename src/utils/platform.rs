//! Platform-specific helpers.
//!
//! Windows is the production target. Other platforms are supported well enough
//! to develop and test the updater: paths resolve under the home directory and
//! the Windows-only process flags are skipped.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// Returns true if running on Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Directory for nvmw's own state: config, error log.
///
/// `%LOCALAPPDATA%\nvmw` on Windows, `~/.nvmw` elsewhere.
pub fn data_dir() -> Result<PathBuf> {
    if is_windows() {
        let local = dirs::data_local_dir().context("Unable to determine local app data directory")?;
        Ok(local.join("nvmw"))
    } else {
        let home = dirs::home_dir().context("Unable to determine home directory")?;
        Ok(home.join(".nvmw"))
    }
}

/// Directory of the running executable, which is the installation directory.
pub fn install_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Unable to locate the running executable")?;
    exe.parent()
        .map(PathBuf::from)
        .context("Running executable has no parent directory")
}

/// Configure `command` to outlive the current process without a console.
///
/// On Windows the child gets its own process group, no console window and no
/// inherited console. Elsewhere only the standard streams are detached.
pub fn detach(command: &mut Command) -> &mut Command {
    use std::process::Stdio;

    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }

    command
}
