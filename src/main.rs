//! backup-arcgis-item - command-line entry point
//!
//! Thin wrapper around the library: collects the four inputs from the command
//! line (or `.env` / environment for credentials), applies config overrides
//! and prints a one-line summary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use arcgis_item_backup::{BackupResult, BackupTarget, Config, Result, backup_item};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Export an ArcGIS Online item and keep a versioned local copy
#[derive(Parser)]
#[command(name = "backup-arcgis-item", version, about)]
#[command(
    after_help = "example: backup-arcgis-item https://www.arcgis.com/home/item.html?id=c31146ae5a7d4299a08dd4407526625d ./ {username} {token}"
)]
struct Cli {
    /// Item id, or the item's page URL
    item: Option<String>,

    /// Directory that holds the archive/ tree
    working_dir: Option<PathBuf>,

    /// Account that owns the temporary export item
    #[arg(env = "ARCGIS_USERNAME")]
    username: Option<String>,

    /// Portal token
    #[arg(env = "ARCGIS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Size difference in bytes below which a download counts as unchanged
    #[arg(long)]
    threshold: Option<u64>,

    /// Delay before each export status check, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Give up on the export job after this many seconds
    #[arg(long)]
    poll_timeout_secs: Option<u64>,

    /// Abort when the portal reports the export job as failed
    #[arg(long)]
    fail_on_failed_status: bool,

    /// Portal REST root
    #[arg(long)]
    portal_url: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(result) => {
            println!("{}", result.summary());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error[{}]: {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<BackupResult> {
    let target = BackupTarget::from_parts(cli.item, cli.working_dir, cli.username, cli.token)?;

    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path).await?,
        None => Config::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.archive.size_threshold = threshold;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll.interval = Duration::from_millis(ms);
    }
    if let Some(secs) = cli.poll_timeout_secs {
        config.poll.timeout = Some(Duration::from_secs(secs));
    }
    if cli.fail_on_failed_status {
        config.poll.fail_on_failed_status = true;
    }
    if let Some(url) = cli.portal_url {
        config.portal_url = url;
    }

    backup_item(target, config).await
}
