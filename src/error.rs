//! Error types for arcgis-item-backup
//!
//! Every failure in the backup workflow is fatal to the run. The variants map
//! onto four broad kinds:
//! - configuration problems detected before any network activity
//! - structured errors or non-success statuses reported by the portal
//! - transport failures talking to the portal or the signed storage host
//! - local filesystem failures while staging or archiving the download

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for arcgis-item-backup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for arcgis-item-backup
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which input is missing or invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The input or setting that caused the error (e.g., "token")
        key: Option<String>,
    },

    /// The portal returned an error payload or a non-success status
    #[error("remote error: {0}")]
    Remote(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Filesystem operation failed on a specific path
    #[error("I/O error on {path}: {source}")]
    PathIo {
        /// The path being operated on
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Portal response could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be built or a redirect location could not be resolved
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The portal reported the export job as failed
    ///
    /// Only produced when `PollConfig::fail_on_failed_status` is enabled.
    #[error("export job {job_id} failed: {message}")]
    ExportFailed {
        /// The export job id
        job_id: String,
        /// Status message reported by the portal, if any
        message: String,
    },

    /// The export job did not complete within the configured poll timeout
    #[error("export job {job_id} did not complete within {waited:?}")]
    PollTimeout {
        /// The export job id
        job_id: String,
        /// Total time spent waiting between status checks
        waited: Duration,
    },
}

impl Error {
    /// Create a configuration error tied to a specific input
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Attach a path to an I/O error
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathIo {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable error kind, stable across releases
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Remote(_) | Error::ExportFailed { .. } => "remote_error",
            Error::Network(_) => "network_error",
            Error::PathIo { .. } => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::PollTimeout { .. } => "poll_timeout",
        }
    }

    /// Whether this error was raised before any network activity could start
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. })
    }
}
