//! Archive extraction and staging.
//!
//! The downloaded release archive is extracted into a scratch directory, never
//! into the live installation. From there [`PackageInstaller::stage`] copies the
//! new executable into the hidden `.update` directory of the installation and
//! every other file into `.update/payload`, where the Watcher picks them up
//! once the running binary has exited.
//!
//! Entry names are untrusted. Any entry with a `..` segment is skipped, logged
//! and reported in [`ExtractReport::skipped`]; the remaining names must also
//! pass `zip`'s own `enclosed_name` check.

use crate::constants::{PAYLOAD_DIR, PRIMARY_EXECUTABLE};
use crate::core::NvmwError;
use crate::utils::fs::{ensure_dir, has_parent_traversal, set_hidden};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files written, relative to the extraction root.
    pub files: Vec<PathBuf>,
    /// Entry names rejected as unsafe.
    pub skipped: Vec<String>,
}

/// Update artifacts placed in the installation's staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    pub staging_dir: PathBuf,
    /// The new primary executable, swapped in by the Watcher.
    pub executable: PathBuf,
    /// Support files copied into the installation after the swap.
    pub payload_dir: PathBuf,
    pub payload_files: usize,
}

pub struct PackageInstaller;

impl PackageInstaller {
    /// Extract `archive` into `dest`.
    ///
    /// Fails with [`NvmwError::ArchiveError`] if the archive cannot be read and
    /// with [`NvmwError::UnsafeArchive`] if every entry was rejected.
    pub fn extract_blocking(archive: &Path, dest: &Path) -> Result<ExtractReport> {
        let archive_error = |reason: String| NvmwError::ArchiveError {
            path: archive.display().to_string(),
            reason,
        };

        let file = fs::File::open(archive).map_err(|e| archive_error(e.to_string()))?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| archive_error(e.to_string()))?;
        ensure_dir(dest)?;

        let mut report = ExtractReport::default();
        let mut safe_entries = 0usize;

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| archive_error(e.to_string()))?;
            let raw_name = entry.name().to_string();

            if has_parent_traversal(&raw_name) {
                warn!("Skipping archive entry with parent traversal: {}", raw_name);
                report.skipped.push(raw_name);
                continue;
            }
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping archive entry with unsafe path: {}", raw_name);
                report.skipped.push(raw_name);
                continue;
            };
            safe_entries += 1;

            let out_path = dest.join(&relative);
            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
                #[cfg(unix)]
                apply_mode(&out_path, entry.unix_mode());
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| archive_error(format!("{raw_name}: {e}")))?;

            #[cfg(unix)]
            apply_mode(&out_path, entry.unix_mode());

            debug!("Extracted {}", relative.display());
            report.files.push(relative);
        }

        if safe_entries == 0 {
            if report.skipped.is_empty() {
                return Err(archive_error("archive is empty".to_string()).into());
            }
            return Err(NvmwError::UnsafeArchive {
                skipped: report.skipped.len(),
            }
            .into());
        }

        info!(
            "Extracted {} files to {} ({} entries skipped)",
            report.files.len(),
            dest.display(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Locate the primary executable in an extracted tree.
    ///
    /// A top-level match wins over a nested one.
    pub fn find_executable(root: &Path) -> Result<PathBuf> {
        let top = root.join(PRIMARY_EXECUTABLE);
        if top.is_file() {
            return Ok(top);
        }

        WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .find(|entry| entry.file_type().is_file() && entry.file_name() == PRIMARY_EXECUTABLE)
            .map(walkdir::DirEntry::into_path)
            .ok_or_else(|| {
                NvmwError::MissingExecutable {
                    name: PRIMARY_EXECUTABLE.to_string(),
                }
                .into()
            })
    }

    /// Copy an extracted tree into `staging_dir`.
    ///
    /// The primary executable lands at `staging_dir/<exe>`, everything else
    /// under `staging_dir/payload` with its relative layout preserved. The
    /// staging directory is marked hidden.
    pub fn stage(extracted: &Path, staging_dir: &Path) -> Result<StagedUpdate> {
        let staging_error = |path: &Path, e: &dyn std::fmt::Display| NvmwError::StagingFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let source_exe = Self::find_executable(extracted)?;
        let payload_dir = staging_dir.join(PAYLOAD_DIR);
        fs::create_dir_all(&payload_dir).map_err(|e| staging_error(&payload_dir, &e))?;
        if let Err(e) = set_hidden(staging_dir) {
            warn!("Could not hide {}: {:#}", staging_dir.display(), e);
        }

        let executable = staging_dir.join(PRIMARY_EXECUTABLE);
        fs::copy(&source_exe, &executable).map_err(|e| staging_error(&executable, &e))?;
        info!("Staged {} at {}", PRIMARY_EXECUTABLE, executable.display());

        let mut payload_files = 0;
        for entry in WalkDir::new(extracted).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if !entry.file_type().is_file() || path == source_exe {
                continue;
            }
            let Ok(relative) = path.strip_prefix(extracted) else {
                continue;
            };
            let dest = payload_dir.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| staging_error(parent, &e))?;
            }
            fs::copy(path, &dest).map_err(|e| staging_error(&dest, &e))?;
            payload_files += 1;
        }
        debug!("Staged {} support files in {}", payload_files, payload_dir.display());

        Ok(StagedUpdate {
            staging_dir: staging_dir.to_path_buf(),
            executable,
            payload_dir,
            payload_files,
        })
    }

    /// Copy a secondary release asset into the staging directory.
    pub fn stage_asset(asset: &Path, staging_dir: &Path) -> Result<PathBuf> {
        let name = asset.file_name().ok_or_else(|| NvmwError::StagingFailed {
            path: asset.display().to_string(),
            reason: "asset has no file name".to_string(),
        })?;
        let dest = staging_dir.join(name);
        fs::copy(asset, &dest).map_err(|e| NvmwError::StagingFailed {
            path: dest.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(dest)
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_zip;
    use tempfile::TempDir;

    #[test]
    fn test_extract_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("assets.zip");
        write_zip(&archive, &[(PRIMARY_EXECUTABLE, "new"), ("nested/elevate.cmd", "x")]).unwrap();

        let dest = temp.path().join("assets");
        let report = PackageInstaller::extract_blocking(&archive, &dest).unwrap();

        assert_eq!(report.files.len(), 2);
        assert!(report.skipped.is_empty());
        assert_eq!(fs::read(dest.join(PRIMARY_EXECUTABLE)).unwrap(), b"new");
        assert_eq!(fs::read(dest.join("nested").join("elevate.cmd")).unwrap(), b"x");
    }

    #[test]
    fn test_traversal_entries_are_skipped_and_recorded() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("assets.zip");
        write_zip(
            &archive,
            &[("../evil.exe", "evil"), ("ok\\..\\..\\evil2.exe", "evil"), (PRIMARY_EXECUTABLE, "new")],
        )
        .unwrap();

        let dest = temp.path().join("assets");
        let report = PackageInstaller::extract_blocking(&archive, &dest).unwrap();

        assert_eq!(report.skipped, vec!["../evil.exe", "ok\\..\\..\\evil2.exe"]);
        assert_eq!(report.files, vec![PathBuf::from(PRIMARY_EXECUTABLE)]);
        assert!(!temp.path().join("evil.exe").exists());
        assert!(!temp.path().join("evil2.exe").exists());
    }

    #[test]
    fn test_traversal_only_archive_is_fatal() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("assets.zip");
        write_zip(&archive, &[("../evil.exe", "evil")]).unwrap();

        let err = PackageInstaller::extract_blocking(&archive, &temp.path().join("assets"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NvmwError>(),
            Some(NvmwError::UnsafeArchive { skipped: 1 })
        ));
    }

    #[test]
    fn test_corrupt_archive_is_archive_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("assets.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = PackageInstaller::extract_blocking(&archive, &temp.path().join("assets"))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<NvmwError>(), Some(NvmwError::ArchiveError { .. })));
    }

    #[test]
    fn test_stage_splits_executable_and_payload() {
        let temp = TempDir::new().unwrap();
        let extracted = temp.path().join("assets");
        fs::create_dir_all(extracted.join("docs")).unwrap();
        fs::write(extracted.join(PRIMARY_EXECUTABLE), b"new").unwrap();
        fs::write(extracted.join("elevate.vbs"), b"vbs").unwrap();
        fs::write(extracted.join("docs").join("LICENSE"), b"mit").unwrap();

        let staging = temp.path().join("install").join(".update");
        let staged = PackageInstaller::stage(&extracted, &staging).unwrap();

        assert_eq!(staged.executable, staging.join(PRIMARY_EXECUTABLE));
        assert_eq!(fs::read(&staged.executable).unwrap(), b"new");
        assert_eq!(staged.payload_files, 2);
        assert!(staged.payload_dir.join("elevate.vbs").exists());
        assert!(staged.payload_dir.join("docs").join("LICENSE").exists());
        assert!(!staged.payload_dir.join(PRIMARY_EXECUTABLE).exists());
    }

    #[test]
    fn test_stage_without_executable_fails() {
        let temp = TempDir::new().unwrap();
        let extracted = temp.path().join("assets");
        fs::create_dir_all(&extracted).unwrap();
        fs::write(extracted.join("README.md"), b"readme").unwrap();

        let err = PackageInstaller::stage(&extracted, &temp.path().join(".update")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<NvmwError>(),
            Some(NvmwError::MissingExecutable { .. })
        ));
    }
}
