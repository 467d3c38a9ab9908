//! Local archive layout and size-based deduplication
//!
//! Layout below the working directory:
//!
//! ```text
//! archive/
//!   tmp/<itemId>.zip             scratch download, replaced on every run
//!   <itemId>/<millis>.zip        retained snapshots, newest sorts last
//! ```
//!
//! Snapshots are never modified once written. A new download is only kept
//! when its size differs from the newest snapshot by at least the configured
//! threshold.

use std::path::{Path, PathBuf};

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::types::{DownloadedFile, ItemId};

const ARCHIVE_DIR: &str = "archive";
const TMP_DIR: &str = "tmp";
const EXTENSION: &str = "zip";

/// A retained snapshot in an item's archive directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File name, e.g. `1700000000000.zip`
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Manages the `archive/` tree of one working directory
#[derive(Clone, Debug)]
pub struct Archiver {
    root: PathBuf,
    size_threshold: u64,
}

impl Archiver {
    /// Create an archiver rooted at `<working_dir>/archive`
    pub fn new(working_dir: &Path, config: &ArchiveConfig) -> Self {
        Self {
            root: working_dir.join(ARCHIVE_DIR),
            size_threshold: config.size_threshold,
        }
    }

    /// `<working_dir>/archive`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<working_dir>/archive/tmp`
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    /// Scratch location for an item's download
    pub fn temp_path(&self, item_id: &ItemId) -> PathBuf {
        self.tmp_dir()
            .join(format!("{}.{}", item_id.as_str(), EXTENSION))
    }

    /// Directory holding an item's snapshots
    pub fn item_dir(&self, item_id: &ItemId) -> PathBuf {
        self.root.join(item_id.as_str())
    }

    /// Create `archive/` and `archive/tmp/`
    ///
    /// Directories that already exist are fine, including ones created
    /// concurrently by another run.
    pub async fn ensure_directories(&self) -> Result<()> {
        create_dir_tolerant(&self.root).await?;
        create_dir_tolerant(&self.tmp_dir()).await
    }

    /// Newest snapshot of an item, if any
    ///
    /// Snapshot names are sorted as strings and the greatest one wins.
    pub async fn latest_entry(&self, item_id: &ItemId) -> Result<Option<ArchiveEntry>> {
        let dir = self.item_dir(item_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::path_io(&dir, e)),
        };

        let mut latest: Option<(String, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::path_io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| Error::path_io(&path, e))?
                .is_file();
            if !is_file {
                continue;
            }
            if latest.as_ref().is_none_or(|(current, _)| name > *current) {
                latest = Some((name, path));
            }
        }

        let Some((name, path)) = latest else {
            return Ok(None);
        };
        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::path_io(&path, e))?
            .len();

        Ok(Some(ArchiveEntry { name, path, size }))
    }

    /// Whether two sizes are close enough to count as the same snapshot
    pub fn is_duplicate_size(&self, new_size: u64, latest_size: u64) -> bool {
        new_size.abs_diff(latest_size) < self.size_threshold
    }

    /// Whether a download of `new_size` bytes duplicates the newest snapshot
    ///
    /// Returns `false` when the item has no snapshots yet.
    pub async fn compare_latest(&self, item_id: &ItemId, new_size: u64) -> Result<bool> {
        let Some(latest) = self.latest_entry(item_id).await? else {
            return Ok(false);
        };
        let duplicate = self.is_duplicate_size(new_size, latest.size);
        tracing::debug!(
            item_id = %item_id,
            new_size,
            latest = %latest.name,
            latest_size = latest.size,
            threshold = self.size_threshold,
            duplicate,
            "compared download with latest snapshot"
        );
        Ok(duplicate)
    }

    /// Move a download into the item's archive directory
    ///
    /// The entry is named after `now_millis`; if that would not sort after
    /// the current newest snapshot, the name is bumped past it.
    pub async fn promote(
        &self,
        download: &DownloadedFile,
        item_id: &ItemId,
        now_millis: i64,
    ) -> Result<PathBuf> {
        let dir = self.item_dir(item_id);
        create_dir_tolerant(&dir).await?;

        let latest = self.latest_entry(item_id).await?;
        let name = next_entry_name(now_millis, latest.as_ref().map(|e| e.name.as_str()));
        let dest = dir.join(name);

        tokio::fs::rename(&download.path, &dest)
            .await
            .map_err(|e| Error::path_io(&download.path, e))?;

        tracing::info!(item_id = %item_id, path = %dest.display(), bytes = download.size, "archived new snapshot");
        Ok(dest)
    }

    /// Remove a download that duplicates the newest snapshot
    pub async fn discard(&self, download: &DownloadedFile) -> Result<()> {
        tokio::fs::remove_file(&download.path)
            .await
            .map_err(|e| Error::path_io(&download.path, e))?;
        tracing::info!(path = %download.path.display(), "discarded duplicate download");
        Ok(())
    }
}

/// Name for a new snapshot that sorts after `latest`
fn next_entry_name(now_millis: i64, latest: Option<&str>) -> String {
    let candidate = format!("{:013}.{}", now_millis, EXTENSION);
    let Some(latest) = latest else {
        return candidate;
    };
    if candidate.as_str() > latest {
        return candidate;
    }

    let stem = latest.strip_suffix(".zip").unwrap_or(latest);
    match stem.parse::<i64>().ok().and_then(|n| n.checked_add(1)) {
        Some(next) => format!("{:013}.{}", next, EXTENSION),
        None => format!("{}1.{}", stem, EXTENSION),
    }
}

async fn create_dir_tolerant(path: &Path) -> Result<()> {
    match tokio::fs::create_dir(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "created directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(Error::path_io(path, e)),
    }
}
