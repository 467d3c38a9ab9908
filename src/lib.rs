//! # arcgis-item-backup
//!
//! Keeps a local, versioned archive of a single ArcGIS Online item.
//!
//! A backup run exports the item on the portal, waits for the export job,
//! downloads the resulting archive, removes the export item again, and keeps
//! the download only if its size differs from the newest local snapshot.
//!
//! ## Quick Start
//!
//! ```no_run
//! use arcgis_item_backup::{BackupTarget, Config, ItemBackup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target = BackupTarget::new(
//!         "c31146ae5a7d4299a08dd4407526625d",
//!         "./backups",
//!         "gis_admin",
//!         "<token>",
//!     )?;
//!
//!     let mut config = Config::default();
//!     config.archive.size_threshold = 1024;
//!
//!     let mut backup = ItemBackup::new(target, config)?;
//!     let result = backup.run().await?;
//!     println!("{}", result.summary());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Local archive layout and deduplication
pub mod archive;
/// Backup workflow orchestration
pub mod backup;
/// Time abstraction
pub mod clock;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Export job polling
pub mod poller;
/// Portal REST client
pub mod portal;
/// Core types
pub mod types;

// Re-export commonly used types
pub use archive::{ArchiveEntry, Archiver};
pub use backup::{ItemBackup, backup_item};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use config::{ArchiveConfig, BackupTarget, Config, PollConfig};
pub use error::{Error, Result};
pub use poller::{JobStatusSource, await_export_completion};
pub use portal::PortalClient;
pub use types::{
    BackupResult, DownloadedFile, ExportJob, ItemDetails, ItemId, JobStatus, JobStatusResponse,
    Stage,
};
