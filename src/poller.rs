//! Export job polling
//!
//! Polling is a plain async loop: wait one interval, check the status, and
//! repeat until the portal reports `completed`. Exactly one status request is
//! in flight at a time because the next wait only starts once the previous
//! check has returned.
//!
//! By default every status other than `completed` (including `failed`) means
//! "not done yet", so a job the portal has given up on is polled forever.
//! `PollConfig::timeout` and `PollConfig::fail_on_failed_status` turn that
//! into an error instead.

use async_trait::async_trait;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::types::{ExportJob, JobStatus, JobStatusResponse};

/// Something that can report the status of an export job
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    /// Fetch the current status of `job`
    async fn job_status(&self, job: &ExportJob) -> Result<JobStatusResponse>;
}

/// Poll `source` until `job` completes
///
/// Returns the status response that reported completion. Errors from the
/// status source are not retried.
pub async fn await_export_completion<S, C>(
    source: &S,
    clock: &C,
    job: &ExportJob,
    config: &PollConfig,
) -> Result<JobStatusResponse>
where
    S: JobStatusSource + ?Sized,
    C: Clock,
{
    let mut checks: u32 = 0;
    let mut waited = Duration::ZERO;

    loop {
        clock.sleep(config.interval).await;
        waited += config.interval;

        let response = source.job_status(job).await?;
        checks += 1;

        match response.status {
            JobStatus::Completed => {
                tracing::debug!(
                    job_id = %job.job_id,
                    checks,
                    "export job completed"
                );
                return Ok(response);
            }
            JobStatus::Failed if config.fail_on_failed_status => {
                return Err(Error::ExportFailed {
                    job_id: job.job_id.clone(),
                    message: response
                        .status_message
                        .unwrap_or_else(|| "no status message".to_string()),
                });
            }
            status => {
                tracing::trace!(job_id = %job.job_id, %status, checks, "export job not done");
            }
        }

        if let Some(timeout) = config.timeout
            && waited >= timeout
        {
            tracing::warn!(job_id = %job.job_id, checks, "gave up waiting for export job");
            return Err(Error::PollTimeout {
                job_id: job.job_id.clone(),
                waited,
            });
        }
    }
}
