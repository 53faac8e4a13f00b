//! Error handling for nvmw
//!
//! This module provides the strongly-typed error enum used by the self-update engine and
//! the user-facing wrapper the CLI prints. The design follows two rules:
//! 1. **Typed errors** so callers can react to a specific failure (a checksum mismatch is
//!    handled differently from a network timeout)
//! 2. **Friendly output** with a suggestion the user can act on
//!
//! # Architecture
//!
//! - [`NvmwError`] - every failure mode of the update cycle and its helpers
//! - [`ErrorContext`] - adds details and a suggestion for terminal display
//!
//! # Fatal vs Recoverable
//!
//! Which variants abort an update is decided by the orchestrator, not the type. Advisory
//! feed failures are logged and swallowed; everything raised before the Watcher launches
//! is fatal and leaves the installation untouched.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nvmw_cli::core::{NvmwError, user_friendly_error};
//!
//! let error = NvmwError::ChecksumMismatch {
//!     expected: "abc".to_string(),
//!     actual: "def".to_string(),
//! };
//! user_friendly_error(anyhow::Error::from(error)).display();
//! ```

use crate::version::VersionError;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for nvmw operations.
#[derive(Error, Debug)]
pub enum NvmwError {
    /// A feed or download answered with something other than `200 OK`.
    #[error("Request to {url} failed with HTTP status {status}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code returned
        status: u16,
    },

    /// The request never produced a response.
    #[error("Network error: {operation}")]
    NetworkError {
        /// What was being fetched
        operation: String,
        /// Transport-level reason
        reason: String,
    },

    /// The release descriptor could not be understood.
    #[error("Invalid release metadata: {reason}")]
    InvalidRelease {
        /// What was wrong with it
        reason: String,
    },

    /// A version string failed to parse.
    #[error("Invalid version '{version}': {source}")]
    InvalidVersion {
        /// The rejected text
        version: String,
        /// Parser diagnosis
        #[source]
        source: VersionError,
    },

    /// The downloaded archive does not match its published digest.
    #[error("Cannot validate update file (checksum mismatch): expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest from the sidecar
        expected: String,
        /// Digest of the downloaded bytes
        actual: String,
    },

    /// The sidecar held no digest token.
    #[error("Checksum file at {url} is empty")]
    ChecksumUnavailable {
        /// Sidecar URL
        url: String,
    },

    /// The archive is unreadable or corrupt.
    #[error("Failed to extract update archive {path}: {reason}")]
    ArchiveError {
        /// Archive location
        path: String,
        /// Underlying zip/io failure
        reason: String,
    },

    /// Every entry of the archive was rejected by the traversal guard.
    #[error("Update archive contains no safe entries ({skipped} entries rejected)")]
    UnsafeArchive {
        /// Number of skipped entries
        skipped: usize,
    },

    /// The archive does not contain the primary executable.
    #[error("Update archive does not contain {name}")]
    MissingExecutable {
        /// Expected entry name
        name: String,
    },

    /// The pre-update snapshot could not be written.
    #[error("Failed to create backup at {path}: {reason}")]
    BackupFailed {
        /// Backup archive path
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// A staged artifact could not be placed in the hidden staging directory.
    #[error("Failed to stage {path}: {reason}")]
    StagingFailed {
        /// Staging destination
        path: String,
        /// Underlying reason
        reason: String,
    },

    /// The Watcher process could not be prepared or started.
    #[error("Failed to launch update watcher: {reason}")]
    WatcherLaunchFailed {
        /// Underlying reason
        reason: String,
    },

    /// The Watcher stopped in a given state.
    #[error("Update watcher failed while {state}: {reason}")]
    WatcherFailed {
        /// Watcher state at the time of failure
        state: String,
        /// Underlying reason
        reason: String,
    },

    /// The OS task scheduler rejected a registration or removal.
    #[error("Scheduled task '{task}' could not be updated: {reason}")]
    SchedulerError {
        /// Task name
        task: String,
        /// Scheduler output
        reason: String,
    },

    /// No task scheduler exists on this host.
    #[error("The system task scheduler is not available on this platform")]
    SchedulerUnavailable,

    /// Configuration problem
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description
        message: String,
    },

    /// File system error
    #[error("File system error: {operation}")]
    FileSystemError {
        /// The file system operation that failed
        operation: String,
        /// Path where the file system error occurred
        path: String,
    },

    /// Permission denied
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// The operation that was denied
        operation: String,
        /// Path where permission was denied
        path: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for NvmwError {
    fn clone(&self) -> Self {
        match self {
            Self::HttpStatus {
                url,
                status,
            } => Self::HttpStatus {
                url: url.clone(),
                status: *status,
            },
            Self::NetworkError {
                operation,
                reason,
            } => Self::NetworkError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::InvalidRelease {
                reason,
            } => Self::InvalidRelease {
                reason: reason.clone(),
            },
            Self::InvalidVersion {
                version,
                source,
            } => Self::InvalidVersion {
                version: version.clone(),
                source: source.clone(),
            },
            Self::ChecksumMismatch {
                expected,
                actual,
            } => Self::ChecksumMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::ChecksumUnavailable {
                url,
            } => Self::ChecksumUnavailable {
                url: url.clone(),
            },
            Self::ArchiveError {
                path,
                reason,
            } => Self::ArchiveError {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::UnsafeArchive {
                skipped,
            } => Self::UnsafeArchive {
                skipped: *skipped,
            },
            Self::MissingExecutable {
                name,
            } => Self::MissingExecutable {
                name: name.clone(),
            },
            Self::BackupFailed {
                path,
                reason,
            } => Self::BackupFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::StagingFailed {
                path,
                reason,
            } => Self::StagingFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::WatcherLaunchFailed {
                reason,
            } => Self::WatcherLaunchFailed {
                reason: reason.clone(),
            },
            Self::WatcherFailed {
                state,
                reason,
            } => Self::WatcherFailed {
                state: state.clone(),
                reason: reason.clone(),
            },
            Self::SchedulerError {
                task,
                reason,
            } => Self::SchedulerError {
                task: task.clone(),
                reason: reason.clone(),
            },
            Self::SchedulerUnavailable => Self::SchedulerUnavailable,
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::FileSystemError {
                operation,
                path,
            } => Self::FileSystemError {
                operation: operation.clone(),
                path: path.clone(),
            },
            Self::PermissionDenied {
                operation,
                path,
            } => Self::PermissionDenied {
                operation: operation.clone(),
                path: path.clone(),
            },
            // io::Error is not Clone; keep kind and message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

impl NvmwError {
    /// Whether this failure came from the network rather than local state.
    ///
    /// Update checks triggered by scheduled tasks treat these as "try again later".
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::HttpStatus { .. } | Self::NetworkError { .. })
    }
}

/// Error wrapper carrying a details line and a suggestion for terminal display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: NvmwError,
    /// What the user can do about it
    pub suggestion: Option<String>,
    /// Extra background on the failure
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: NvmwError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
///
/// Typed [`NvmwError`]s anywhere in the chain take priority; plain IO errors are mapped by
/// kind; anything else is reported with its full cause chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    if let Some(nvmw_error) = error.chain().find_map(|e| e.downcast_ref::<NvmwError>()) {
        return create_error_context(nvmw_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(NvmwError::PermissionDenied {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion(
                    "Run the command from an elevated prompt or check the installation directory's permissions",
                )
                .with_details("nvmw could not read or write a file it needs");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(NvmwError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(NvmwError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your nvmw config.toml");
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(NvmwError::Other {
        message,
    })
}

fn create_error_context(error: NvmwError) -> ErrorContext {
    const UNTOUCHED: &str = "The installation was not modified";

    let (suggestion, details): (Option<&str>, Option<&str>) = match &error {
        NvmwError::HttpStatus {
            status: 403 | 429,
            ..
        } => (
            Some("The release feed is rate limiting this address. Try again in an hour"),
            Some(UNTOUCHED),
        ),
        NvmwError::HttpStatus { .. } => {
            (Some("Check your internet connection and try again later"), Some(UNTOUCHED))
        }
        NvmwError::NetworkError { .. } => (
            Some("Check your internet connection or proxy settings and try again"),
            Some(UNTOUCHED),
        ),
        NvmwError::ChecksumMismatch { .. } | NvmwError::ChecksumUnavailable { .. } => (
            Some("Run the upgrade again; if the problem persists the release may still be uploading"),
            Some("The download was discarded before extraction. The installation was not modified"),
        ),
        NvmwError::UnsafeArchive { .. } | NvmwError::MissingExecutable { .. } => (
            None,
            Some("The release archive does not have the expected layout. The installation was not modified"),
        ),
        NvmwError::BackupFailed { .. } | NvmwError::StagingFailed { .. } => (
            Some("Make sure the installation directory is writable and has free space"),
            Some(UNTOUCHED),
        ),
        NvmwError::WatcherLaunchFailed { .. } => (
            Some("Check that antivirus software is not blocking new processes in the temp directory"),
            None,
        ),
        NvmwError::SchedulerError { .. } => {
            (Some("Registering scheduled tasks may require an elevated prompt"), None)
        }
        NvmwError::PermissionDenied { .. } => (Some("Run the command from an elevated prompt"), None),
        NvmwError::ConfigError { .. } | NvmwError::TomlError(_) => {
            (Some("Check the TOML syntax of your nvmw config.toml"), None)
        }
        _ => (None, None),
    };

    let mut ctx = ErrorContext::new(error);
    if let Some(suggestion) = suggestion {
        ctx = ctx.with_suggestion(suggestion);
    }
    if let Some(details) = details {
        ctx = ctx.with_details(details);
    }
    ctx
}
