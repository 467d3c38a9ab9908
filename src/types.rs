//! Core types for arcgis-item-backup

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Name of the scratch directory inside `archive/`
const RESERVED_ID: &str = "tmp";

/// Opaque identifier of a portal item
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Parse an item id from either a bare id or an item page URL
    ///
    /// Item page URLs carry the id in their `id` query parameter, e.g.
    /// `https://www.arcgis.com/home/item.html?id=c31146ae5a7d4299a08dd4407526625d`.
    ///
    /// Ids become directory and file names below `archive/`, so only ASCII
    /// letters, digits, `-` and `_` are accepted, and `tmp` is reserved for
    /// the scratch directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use arcgis_item_backup::ItemId;
    ///
    /// let bare = ItemId::parse("c31146ae5a7d4299a08dd4407526625d").unwrap();
    /// let from_url =
    ///     ItemId::parse("https://www.arcgis.com/home/item.html?id=c31146ae5a7d4299a08dd4407526625d")
    ///         .unwrap();
    /// assert_eq!(bare, from_url);
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::config("item_id", "item id is required"));
        }

        if !(input.starts_with("http://") || input.starts_with("https://")) {
            return Self::validated(input);
        }

        let url = url::Url::parse(input).map_err(|e| {
            Error::config("item_id", format!("item URL '{}' is invalid: {}", input, e))
        })?;
        let id = url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "item_id",
                    format!("item URL '{}' has no id query parameter", input),
                )
            })?;
        Self::validated(&id)
    }

    fn validated(id: &str) -> Result<Self> {
        let allowed = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if !id.chars().all(allowed) {
            return Err(Error::config(
                "item_id",
                format!("item id '{}' may only contain letters, digits, '-' and '_'", id),
            ));
        }
        if id == RESERVED_ID {
            return Err(Error::config(
                "item_id",
                format!("item id '{}' is reserved", id),
            ));
        }
        Ok(Self(id.to_string()))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ItemId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Item metadata as returned by the portal
///
/// Only the fields the workflow relies on are typed, everything else the
/// portal sends is kept in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    /// Item id
    pub id: String,
    /// Owning username
    #[serde(default)]
    pub owner: Option<String>,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Item type (e.g., "Feature Service", "File Geodatabase")
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    /// Remaining metadata fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Handle to a server-side export job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    /// Job id used for status checks
    #[serde(rename = "jobId")]
    pub job_id: String,
    /// Id of the temporary export item the job materializes
    #[serde(rename = "exportItemId")]
    pub export_item_id: String,
}

/// Status reported for an export job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, not yet started
    Pending,
    /// Running
    Processing,
    /// Partially complete
    Partial,
    /// Finished; the export item is ready for download
    Completed,
    /// The portal gave up on the job
    Failed,
    /// Any status this crate does not know about
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the export item can be downloaded
    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Partial => "partial",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Body of a job status check
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Current job status
    pub status: JobStatus,
    /// Export item id, present once the job has produced its item
    #[serde(default, rename = "itemId")]
    pub item_id: Option<String>,
    /// Free-form status message
    #[serde(default, rename = "statusMessage")]
    pub status_message: Option<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Archive staged in the temporary download location
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Path of the temporary file
    pub path: PathBuf,
    /// Size of the temporary file in bytes
    pub size: u64,
}

/// Outcome of a completed backup run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BackupResult {
    /// Path of the newly retained archive entry, `None` when the download was a duplicate
    pub filename: Option<PathBuf>,
    /// Metadata of the source item
    pub item_details: ItemDetails,
    /// Whether the download was discarded as unchanged
    pub duplicate: bool,
}

impl BackupResult {
    /// One-line human-readable summary of the run
    pub fn summary(&self) -> String {
        match (&self.filename, self.duplicate) {
            (Some(path), false) => {
                format!("{} completed: {}", self.item_details.title, path.display())
            }
            _ => format!("No updates to {}.", self.item_details.title),
        }
    }
}

/// Workflow stage reached by a backup run
///
/// Stages advance strictly in declaration order; a run ends in either
/// `Promoted` or `DiscardedDuplicate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing has happened yet
    Init,
    /// `archive/` and `archive/tmp/` exist
    DirectoriesEnsured,
    /// Source item metadata fetched
    ItemInspected,
    /// Export job created
    ExportRequested,
    /// Export job reported `completed`
    JobPolled,
    /// Export item metadata fetched
    ExportItemInspected,
    /// Archive written to the temporary location
    Downloaded,
    /// Remote export item deleted
    RemoteArtifactDeleted,
    /// Download retained as a new archive entry
    Promoted,
    /// Download discarded as a duplicate
    DiscardedDuplicate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::DirectoriesEnsured => "directories_ensured",
            Stage::ItemInspected => "item_inspected",
            Stage::ExportRequested => "export_requested",
            Stage::JobPolled => "job_polled",
            Stage::ExportItemInspected => "export_item_inspected",
            Stage::Downloaded => "downloaded",
            Stage::RemoteArtifactDeleted => "remote_artifact_deleted",
            Stage::Promoted => "promoted",
            Stage::DiscardedDuplicate => "discarded_duplicate",
        };
        f.write_str(s)
    }
}
