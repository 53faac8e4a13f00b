//! Release metadata and advisory retrieval.
//!
//! The updater reads two remote documents:
//!
//! - the **release descriptor** (GitHub "latest release" JSON) naming the newest
//!   published version and its downloadable assets
//! - the **advisory feed**, a map from version string (or `"all"`) to operator
//!   messages shown before an upgrade
//!
//! Both are fetched through the [`Transport`] seam so the whole update cycle can
//! run against an in-memory feed in tests. [`HttpTransport`] is the production
//! implementation on top of `reqwest`.
//!
//! Fetch failures are returned to the caller (the check can simply be retried
//! later); advisory failures are logged and degrade to "no warnings".

use crate::constants::{
    CHECKSUM_SUFFIX, GLOBAL_ADVISORY_KEY, HTTP_RETRY_ATTEMPTS, INSTALLER_ASSET,
    MAX_BACKOFF_DELAY_MS, PRIMARY_ASSET, STARTING_BACKOFF_DELAY_MS,
};
use crate::core::NvmwError;
use crate::upgrade::config::UpgradeConfig;
use crate::version::Version;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

/// Byte-level access to remote resources.
///
/// Implementations must treat any status other than `200 OK` as an error of type
/// [`NvmwError::HttpStatus`], and transport failures as
/// [`NvmwError::NetworkError`].
pub trait Transport: Send + Sync {
    /// Fetch a resource fully into memory.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Stream a resource to `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path) -> impl Future<Output = Result<u64>> + Send;
}

/// `reqwest`-backed [`Transport`] sending the updater's identifying headers.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with `User-Agent`, `Cache-Control: no-cache` and
    /// `Pragma: no-cache` on every request.
    pub fn new(config: &UpgradeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, NvmwError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| NvmwError::NetworkError {
            operation: format!("GET {url}"),
            reason: e.to_string(),
        })?;

        if response.status() != StatusCode::OK {
            return Err(NvmwError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_once(&self, url: &str) -> Result<Vec<u8>, NvmwError> {
        let response = self.send(url).await?;
        let body = response.bytes().await.map_err(|e| NvmwError::NetworkError {
            operation: format!("read body of {url}"),
            reason: e.to_string(),
        })?;
        Ok(body.to_vec())
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<u64, NvmwError> {
        let response = self.send(url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| NvmwError::NetworkError {
                operation: format!("download {url}"),
                reason: e.to_string(),
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
        .map(jitter)
        .take(HTTP_RETRY_ATTEMPTS - 1)
}

// Only transport failures are retried; a definite HTTP answer is final.
fn is_transient(error: &NvmwError) -> bool {
    matches!(error, NvmwError::NetworkError { .. })
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        Ok(RetryIf::start(retry_strategy(), || self.get_once(url), is_transient).await?)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        Ok(RetryIf::start(retry_strategy(), || self.download_once(url, dest), is_transient)
            .await?)
    }
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Wire shape of the latest-release document.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Version string of the release.
    pub name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Human-readable release page.
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Advisory {
    #[serde(default)]
    message: Option<String>,
}

/// Everything the orchestrator needs to decide on and apply one update.
#[derive(Debug, Clone)]
pub struct UpdateDescriptor {
    /// Newest published version.
    pub target_version: Version,
    /// Release name as published, e.g. `v1.2.0`.
    pub release_name: String,
    /// Download URL of the primary archive.
    pub archive_url: String,
    /// Download URLs of secondary assets staged alongside the executable.
    pub extra_assets: Vec<String>,
    /// Advisories that apply to every version.
    pub global_warnings: Vec<String>,
    /// Advisories for `target_version` only.
    pub version_warnings: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub release_page: Option<String>,
}

impl UpdateDescriptor {
    /// Build a descriptor from a release document, selecting assets by name.
    pub fn from_release(release: Release) -> Result<Self> {
        let target_version =
            Version::parse(&release.name).map_err(|source| NvmwError::InvalidVersion {
                version: release.name.clone(),
                source,
            })?;

        let archive_url = release
            .assets
            .iter()
            .find(|asset| asset.name == PRIMARY_ASSET)
            .map(|asset| asset.browser_download_url.clone())
            .ok_or_else(|| NvmwError::InvalidRelease {
                reason: format!("release {} has no {PRIMARY_ASSET} asset", release.name),
            })?;

        let extra_assets = release
            .assets
            .iter()
            .filter(|asset| asset.name == INSTALLER_ASSET)
            .map(|asset| asset.browser_download_url.clone())
            .collect();

        Ok(Self {
            target_version,
            release_name: release.name,
            archive_url,
            extra_assets,
            global_warnings: Vec::new(),
            version_warnings: Vec::new(),
            published_at: release.published_at,
            release_page: release.html_url,
        })
    }

    /// Whether `current` is older than the published version.
    ///
    /// Returns the target version string alongside the decision. Pure; performs
    /// no I/O.
    #[must_use]
    pub fn available(&self, current: &Version) -> (String, bool) {
        (self.target_version.to_string(), current < &self.target_version)
    }

    /// [`available`](Self::available) for an unparsed version string.
    pub fn available_since(&self, current: &str) -> Result<(String, bool)> {
        let current = Version::parse(current).map_err(|source| NvmwError::InvalidVersion {
            version: current.to_string(),
            source,
        })?;
        Ok(self.available(&current))
    }

    /// URL of the digest sidecar for the primary archive.
    #[must_use]
    pub fn checksum_url(&self) -> String {
        format!("{}{CHECKSUM_SUFFIX}", self.archive_url)
    }

    /// Merge advisory feed entries for `"all"` and for this version.
    ///
    /// Version entries are looked up under the normalized version and under
    /// the release name as published.
    pub fn apply_advisories(&mut self, feed: &HashMap<String, Vec<serde_json::Value>>) {
        let messages = |key: &str| -> Vec<String> {
            feed.get(key)
                .into_iter()
                .flatten()
                .filter_map(|value| serde_json::from_value::<Advisory>(value.clone()).ok())
                .filter_map(|advisory| advisory.message)
                .collect()
        };

        self.global_warnings.extend(messages(GLOBAL_ADVISORY_KEY));
        let normalized = self.target_version.to_string();
        self.version_warnings.extend(messages(&normalized));
        if self.release_name != normalized {
            self.version_warnings.extend(messages(&self.release_name));
        }
    }
}

/// Fetches the release descriptor and its advisories.
///
/// # Examples
///
/// ```rust,no_run
/// use nvmw_cli::upgrade::config::UpgradeConfig;
/// use nvmw_cli::upgrade::metadata::{HttpTransport, UpdateMetadataFetcher};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpgradeConfig::default();
/// let fetcher = UpdateMetadataFetcher::new(HttpTransport::new(&config)?, &config);
/// let descriptor = fetcher.fetch().await?;
/// let (version, newer) = descriptor.available_since(env!("CARGO_PKG_VERSION"))?;
/// println!("{version} available: {newer}");
/// # Ok(())
/// # }
/// ```
pub struct UpdateMetadataFetcher<T> {
    transport: T,
    release_url: String,
    advisory_url: String,
}

impl<T: Transport> UpdateMetadataFetcher<T> {
    pub fn new(transport: T, config: &UpgradeConfig) -> Self {
        Self {
            transport,
            release_url: config.release_url.clone(),
            advisory_url: config.advisory_url.clone(),
        }
    }

    /// The underlying transport, shared with the download steps.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch and parse the release descriptor, then merge advisories.
    pub async fn fetch(&self) -> Result<UpdateDescriptor> {
        info!("Checking for updates at {}", self.release_url);
        let body = self
            .transport
            .get(&self.release_url)
            .await
            .context("Failed to obtain update data")?;

        let release: Release =
            serde_json::from_slice(&body).map_err(|e| NvmwError::InvalidRelease {
                reason: e.to_string(),
            })?;
        debug!("Latest release: {} ({} assets)", release.name, release.assets.len());

        let mut descriptor = UpdateDescriptor::from_release(release)?;
        debug!("Source URL: {}", descriptor.archive_url);

        match self.fetch_advisories().await {
            Ok(feed) => descriptor.apply_advisories(&feed),
            Err(e) => warn!("Advisory feed unavailable, continuing without warnings: {:#}", e),
        }

        debug!(
            global = descriptor.global_warnings.len(),
            version = descriptor.version_warnings.len(),
            "Advisories merged"
        );
        Ok(descriptor)
    }

    async fn fetch_advisories(&self) -> Result<HashMap<String, Vec<serde_json::Value>>> {
        debug!("Downloading advisories from {}", self.advisory_url);
        let body = self.transport.get(&self.advisory_url).await?;
        serde_json::from_slice(&body).context("Failed to parse advisory feed")
    }
}
