use crate::core::NvmwError;
use crate::upgrade::metadata::Transport;
use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Download integrity checks for release archives.
///
/// Every published archive has a sibling `<archive URL>.checksum.txt` holding
/// its MD5 digest as a single hex token. The digest only guards against
/// transfer corruption; it is not a signature.
///
/// Verification happens before anything is extracted. A mismatch is reported as
/// [`NvmwError::ChecksumMismatch`] and the caller aborts with the installation
/// untouched.
///
/// # Examples
///
/// ```rust,no_run
/// use nvmw_cli::upgrade::ChecksumVerifier;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let archive = Path::new("assets.zip");
/// let expected = ChecksumVerifier::parse_sidecar("3B5D5C3712955042212316173CCF37BE  nvm-noinstall.zip");
/// if let Some(expected) = expected {
///     ChecksumVerifier::verify_checksum(archive, &expected).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the lowercase hex MD5 digest of a file, streaming its contents.
    pub async fn compute_md5(file_path: &Path) -> Result<String> {
        debug!("Computing MD5 checksum for: {:?}", file_path);

        let mut file = tokio::fs::File::open(file_path)
            .await
            .with_context(|| format!("Failed to open file: {file_path:?}"))?;

        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read file: {file_path:?}"))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// First whitespace-delimited token of a sidecar file, if any.
    #[must_use]
    pub fn parse_sidecar(content: &str) -> Option<String> {
        content.split_whitespace().next().map(str::to_string)
    }

    /// Compare a file's digest with `expected`, ignoring case.
    pub async fn verify_checksum(file_path: &Path, expected_checksum: &str) -> Result<()> {
        info!("Verifying checksum for: {:?}", file_path);

        let actual_checksum = Self::compute_md5(file_path).await?;

        if !actual_checksum.eq_ignore_ascii_case(expected_checksum.trim()) {
            return Err(NvmwError::ChecksumMismatch {
                expected: expected_checksum.trim().to_string(),
                actual: actual_checksum,
            }
            .into());
        }

        info!("Checksum verification successful");
        Ok(())
    }

    /// Download the sidecar at `checksum_url` and return its digest token.
    pub async fn fetch_expected_checksum<T: Transport>(
        transport: &T,
        checksum_url: &str,
    ) -> Result<String> {
        debug!("Fetching checksum from: {}", checksum_url);

        let body = transport.get(checksum_url).await.context("Failed to download checksum")?;
        let content = String::from_utf8_lossy(&body);

        Self::parse_sidecar(&content).ok_or_else(|| {
            NvmwError::ChecksumUnavailable {
                url: checksum_url.to_string(),
            }
            .into()
        })
    }

    /// Fetch the sidecar and verify `file_path` against it.
    pub async fn verify_from_sidecar<T: Transport>(
        transport: &T,
        file_path: &Path,
        checksum_url: &str,
    ) -> Result<()> {
        let expected = Self::fetch_expected_checksum(transport, checksum_url).await?;
        Self::verify_checksum(file_path, &expected).await
    }
}
