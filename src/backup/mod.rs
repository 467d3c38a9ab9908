//! Backup workflow for a single item
//!
//! A run walks through [`Stage`]s strictly in order:
//!
//! 1. ensure `archive/` and `archive/tmp/` exist
//! 2. fetch the source item's metadata
//! 3. request an export and poll the job until it completes
//! 4. fetch the export item's metadata
//! 5. download the export into `archive/tmp/<itemId>.zip`
//! 6. delete the export item from the portal
//! 7. keep the download as a new snapshot, or discard it as a duplicate
//!
//! The first failing stage aborts the run. Nothing done by earlier stages is
//! rolled back, except that the export item is still deleted when the
//! download itself fails.

use crate::archive::Archiver;
use crate::clock::{Clock, SystemClock};
use crate::config::{BackupTarget, Config};
use crate::error::Result;
use crate::poller::await_export_completion;
use crate::portal::PortalClient;
use crate::types::{BackupResult, ItemId, Stage};

/// Backs up one item into a working directory
pub struct ItemBackup<C: Clock = SystemClock> {
    target: BackupTarget,
    config: Config,
    portal: PortalClient,
    archiver: Archiver,
    clock: C,
    stage: Stage,
}

impl ItemBackup<SystemClock> {
    /// Create a backup job using the system clock
    ///
    /// # Errors
    /// Returns [`crate::Error::Config`] if `config` is invalid. No network
    /// activity happens here.
    pub fn new(target: BackupTarget, config: Config) -> Result<Self> {
        Self::with_clock(target, config, SystemClock)
    }
}

impl<C: Clock> ItemBackup<C> {
    /// Create a backup job driven by a custom clock
    pub fn with_clock(target: BackupTarget, config: Config, clock: C) -> Result<Self> {
        config.validate()?;
        let portal = PortalClient::new(&config, &target.username, &target.token)?;
        let archiver = Archiver::new(&target.working_dir, &config.archive);

        Ok(Self {
            target,
            config,
            portal,
            archiver,
            clock,
            stage: Stage::Init,
        })
    }

    /// Last stage the current or most recent run reached
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The item and account this job works on
    pub fn target(&self) -> &BackupTarget {
        &self.target
    }

    /// The local archive this job writes to
    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    /// Run the whole workflow
    ///
    /// # Errors
    /// Any stage failure is returned as-is; [`ItemBackup::stage`] tells how far
    /// the run got.
    pub async fn run(&mut self) -> Result<BackupResult> {
        self.stage = Stage::Init;
        let item_id = self.target.item_id.clone();

        let result = self.run_stages(&item_id).await;
        if let Err(e) = &result {
            tracing::error!(
                item_id = %item_id,
                stage = %self.stage,
                kind = e.kind(),
                error = %e,
                "backup failed"
            );
        }
        result
    }

    async fn run_stages(&mut self, item_id: &ItemId) -> Result<BackupResult> {
        self.archiver.ensure_directories().await?;
        self.advance(Stage::DirectoriesEnsured);

        let item_details = self.portal.get_item_details(item_id.as_str()).await?;
        self.advance(Stage::ItemInspected);

        let title = export_title(self.clock.now_millis(), item_id);
        let job = self.portal.export_item(item_id, &title).await?;
        tracing::debug!(
            item_id = %item_id,
            job_id = %job.job_id,
            export_item_id = %job.export_item_id,
            "export requested"
        );
        self.advance(Stage::ExportRequested);

        let status =
            await_export_completion(&self.portal, &self.clock, &job, &self.config.poll).await?;
        self.advance(Stage::JobPolled);

        let export_item_id = status
            .item_id
            .unwrap_or_else(|| job.export_item_id.clone());
        let export_details = self.portal.get_item_details(&export_item_id).await?;
        self.advance(Stage::ExportItemInspected);

        let temp_path = self.archiver.temp_path(item_id);
        let download = match self
            .portal
            .download_item(&export_details.id, &temp_path)
            .await
        {
            Ok(download) => download,
            Err(e) => {
                if let Err(cleanup) = self.portal.delete_item(&export_details.id).await {
                    tracing::warn!(
                        export_item_id = %export_details.id,
                        error = %cleanup,
                        "could not delete export item after failed download, remove it manually"
                    );
                }
                return Err(e);
            }
        };
        self.advance(Stage::Downloaded);

        self.portal.delete_item(&export_details.id).await?;
        self.advance(Stage::RemoteArtifactDeleted);

        if self.archiver.compare_latest(item_id, download.size).await? {
            self.archiver.discard(&download).await?;
            self.advance(Stage::DiscardedDuplicate);
            return Ok(BackupResult {
                filename: None,
                item_details,
                duplicate: true,
            });
        }

        let path = self
            .archiver
            .promote(&download, item_id, self.clock.now_millis())
            .await?;
        self.advance(Stage::Promoted);

        Ok(BackupResult {
            filename: Some(path),
            item_details,
            duplicate: false,
        })
    }

    fn advance(&mut self, stage: Stage) {
        tracing::debug!(item_id = %self.target.item_id, from = %self.stage, to = %stage, "stage reached");
        self.stage = stage;
    }
}

/// Back up `target` with the system clock
///
/// # Examples
///
/// ```no_run
/// use arcgis_item_backup::{BackupTarget, Config, backup_item};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let target = BackupTarget::new(
///         "c31146ae5a7d4299a08dd4407526625d",
///         "./backups",
///         "gis_admin",
///         "<token>",
///     )?;
///     let result = backup_item(target, Config::default()).await?;
///     println!("{}", result.summary());
///     Ok(())
/// }
/// ```
pub async fn backup_item(target: BackupTarget, config: Config) -> Result<BackupResult> {
    ItemBackup::new(target, config)?.run().await
}

/// Unique export title: creation time plus source item id
fn export_title(now_millis: i64, item_id: &ItemId) -> String {
    format!("{}_{}", now_millis, item_id)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
