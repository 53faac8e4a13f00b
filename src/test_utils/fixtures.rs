//! Release archives and feed documents for tests.

use anyhow::Result;
use md5::{Digest, Md5};
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

/// Write a zip archive at `path` with the given `(name, content)` entries.
///
/// Names are written verbatim, so unsafe names such as `../evil.exe` can be
/// produced on purpose.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().unix_permissions(0o644);

    for (name, content) in entries {
        writer.start_file(*name, options)?;
        writer.write_all(content.as_bytes())?;
    }
    writer.finish()?;
    Ok(())
}

/// Lowercase hex MD5 of `bytes`, as published in checksum sidecars.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// A latest-release document for `version` whose assets live under `base`.
///
/// Includes the primary archive, the installer asset, and an unrelated asset
/// that must be ignored.
pub fn release_json(version: &str, base: &str) -> String {
    serde_json::json!({
        "name": version,
        "published_at": "2024-11-20T18:03:01Z",
        "html_url": format!("https://github.com/coreybutler/nvm-windows/releases/tag/{version}"),
        "assets": [
            {"name": "nvm-setup.zip", "browser_download_url": format!("{base}/nvm-setup.zip")},
            {"name": "nvm-noinstall.zip", "browser_download_url": format!("{base}/nvm-noinstall.zip")},
            {"name": "update.exe", "browser_download_url": format!("{base}/update.exe")}
        ]
    })
    .to_string()
}
