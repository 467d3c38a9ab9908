//! Configuration types for arcgis-item-backup

use crate::error::{Error, Result};
use crate::types::ItemId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local archive configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Size difference in bytes below which a new download counts as a duplicate (default: 100)
    ///
    /// This is a size heuristic, not a content hash: two different archives of
    /// nearly identical size are treated as the same snapshot.
    #[serde(default = "default_size_threshold")]
    pub size_threshold: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            size_threshold: default_size_threshold(),
        }
    }
}

/// Export job polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay before each status check (default: 1 second)
    #[serde(default = "default_poll_interval", with = "duration_format::millis")]
    pub interval: Duration,

    /// Give up after waiting this long (default: None, poll until completed)
    #[serde(default, with = "duration_format::optional_secs")]
    pub timeout: Option<Duration>,

    /// Abort when the portal reports the job as `failed` (default: false)
    ///
    /// Off by default: a failed job keeps being polled, exactly like a pending one.
    #[serde(default)]
    pub fail_on_failed_status: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            timeout: None,
            fail_on_failed_status: false,
        }
    }
}

/// Main configuration for a backup run
///
/// All fields have defaults, so `Config::default()` talks to ArcGIS Online
/// with the stock polling and dedupe behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Portal REST root (default: "https://www.arcgis.com/sharing/rest")
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Export format requested from the portal (default: "File Geodatabase")
    #[serde(default = "default_export_format")]
    pub export_format: String,

    /// TCP connect timeout for portal and storage requests (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_format::secs")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Archive settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Polling settings
    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: default_portal_url(),
            export_format: default_export_format(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            archive: ArchiveConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| Error::path_io(path, e))?;
        let config: Config = serde_json::from_slice(&content).map_err(|e| Error::Config {
            message: format!("invalid config file '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that settings are usable
    pub fn validate(&self) -> Result<()> {
        let portal = url::Url::parse(&self.portal_url).map_err(|e| {
            Error::config(
                "portal_url",
                format!("invalid portal URL '{}': {}", self.portal_url, e),
            )
        })?;
        if portal.cannot_be_a_base() {
            return Err(Error::config(
                "portal_url",
                format!("portal URL '{}' cannot be used as a base", self.portal_url),
            ));
        }
        if self.export_format.trim().is_empty() {
            return Err(Error::config("export_format", "export format is required"));
        }
        if self.poll.interval.is_zero() {
            return Err(Error::config(
                "poll.interval",
                "poll interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// The four inputs that identify a backup run
///
/// Construct with [`BackupTarget::from_parts`] so that a missing input is
/// reported as a configuration error before anything touches the network.
#[derive(Clone)]
pub struct BackupTarget {
    /// Item to back up
    pub item_id: ItemId,
    /// Directory holding the `archive/` tree
    pub working_dir: PathBuf,
    /// Account the export item is created under
    pub username: String,
    /// Portal token sent with every request
    pub token: String,
}

impl BackupTarget {
    /// Build a target from inputs that are all known to be present
    pub fn new(
        item_id: &str,
        working_dir: impl Into<PathBuf>,
        username: &str,
        token: &str,
    ) -> Result<Self> {
        Self::from_parts(
            Some(item_id.to_string()),
            Some(working_dir.into()),
            Some(username.to_string()),
            Some(token.to_string()),
        )
    }

    /// Build a target from possibly missing inputs
    ///
    /// Fails with [`Error::Config`] naming the first missing or blank input.
    pub fn from_parts(
        item_id: Option<String>,
        working_dir: Option<PathBuf>,
        username: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let item_id = required("item_id", item_id)?;
        let working_dir = working_dir
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| missing("working_dir"))?;
        let username = required("username", username)?;
        let token = required("token", token)?;

        Ok(Self {
            item_id: ItemId::parse(&item_id)?,
            working_dir,
            username,
            token,
        })
    }
}

impl std::fmt::Debug for BackupTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupTarget")
            .field("item_id", &self.item_id)
            .field("working_dir", &self.working_dir)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn required(key: &str, value: Option<String>) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(key))
}

fn missing(key: &str) -> Error {
    Error::config(
        key,
        format!(
            "{} is required (item id, working directory path, username and token must all be provided)",
            key
        ),
    )
}

// Default value functions
fn default_portal_url() -> String {
    "https://www.arcgis.com/sharing/rest".to_string()
}

fn default_export_format() -> String {
    "File Geodatabase".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("arcgis-item-backup/{}", env!("CARGO_PKG_VERSION"))
}

fn default_size_threshold() -> u64 {
    100
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

/// Durations are stored as plain integers in config files
mod duration_format {
    /// Whole seconds
    pub mod secs {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
            value.as_secs().serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
            u64::deserialize(deserializer).map(Duration::from_secs)
        }
    }

    /// Milliseconds, for sub-second poll intervals
    pub mod millis {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
            u64::try_from(value.as_millis())
                .unwrap_or(u64::MAX)
                .serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
            u64::deserialize(deserializer).map(Duration::from_millis)
        }
    }

    /// Whole seconds, `null` when unset
    pub mod optional_secs {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.map(|d| d.as_secs()).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
        }
    }
}
