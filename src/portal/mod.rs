//! Portal REST client
//!
//! Wraps the handful of ArcGIS sharing endpoints the backup workflow needs:
//! item metadata, export requests, export job status, item data download and
//! item deletion. Every call carries the account token.
//!
//! The HTTP client never follows redirects on its own. The item data
//! endpoint answers with a redirect to a signed storage URL, and that
//! location is resolved explicitly before the archive is streamed from it.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::poller::JobStatusSource;
use crate::types::{DownloadedFile, ExportJob, ItemDetails, ItemId, JobStatusResponse};

/// Authenticated client for one portal account
pub struct PortalClient {
    http: reqwest::Client,
    base: Url,
    username: String,
    token: String,
    export_format: String,
}

#[derive(Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    success: bool,
}

impl PortalClient {
    /// Create a client for `username` authenticated by `token`
    ///
    /// # Errors
    /// Returns error if the portal URL is invalid or the HTTP client cannot be created
    pub fn new(config: &Config, username: &str, token: &str) -> Result<Self> {
        let base = Url::parse(&config.portal_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::config(
                "portal_url",
                format!("portal URL '{}' cannot be used as a base", config.portal_url),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            base,
            username: username.to_string(),
            token: token.to_string(),
            export_format: config.export_format.clone(),
        })
    }

    /// Build an endpoint URL below the portal root, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fetch metadata for an item
    ///
    /// # Errors
    /// - [`Error::Remote`] if the portal answers with an error payload
    /// - [`Error::Network`] on transport failure
    pub async fn get_item_details(&self, item_id: &str) -> Result<ItemDetails> {
        let url = self.endpoint(&["content", "items", item_id])?;
        tracing::debug!(item_id, "fetching item details");

        let response = self
            .http
            .get(url)
            .query(&[("f", "json"), ("token", self.token.as_str())])
            .send()
            .await?;

        read_portal_json(response, "item details").await
    }

    /// Ask the portal to export `item_id` into a new item titled `title`
    ///
    /// # Errors
    /// - [`Error::Remote`] on a non-success status or an error payload
    /// - [`Error::Network`] on transport failure
    pub async fn export_item(&self, item_id: &ItemId, title: &str) -> Result<ExportJob> {
        let url = self.endpoint(&["content", "users", self.username.as_str(), "export"])?;
        tracing::debug!(item_id = %item_id, title, format = %self.export_format, "requesting export");

        let response = self
            .http
            .post(url)
            .form(&[
                ("token", self.token.as_str()),
                ("f", "json"),
                ("itemId", item_id.as_str()),
                ("exportFormat", self.export_format.as_str()),
                ("title", title),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "Problem creating export: HTTP {}",
                response.status()
            )));
        }

        read_portal_json(response, "export").await
    }

    /// Check the status of an export job
    ///
    /// # Errors
    /// - [`Error::Remote`] on a non-success status or an error payload
    /// - [`Error::Network`] on transport failure
    pub async fn get_job_status(&self, job: &ExportJob) -> Result<JobStatusResponse> {
        let url = self.endpoint(&[
            "content",
            "users",
            self.username.as_str(),
            "items",
            job.export_item_id.as_str(),
            "status",
        ])?;

        let response = self
            .http
            .get(url)
            .query(&[
                ("token", self.token.as_str()),
                ("jobType", "export"),
                ("f", "json"),
                ("jobId", job.job_id.as_str()),
            ])
            .send()
            .await?;

        read_portal_json(response, "job status").await
    }

    /// Download an item's data to `dest`
    ///
    /// The data endpoint normally redirects to a signed storage URL. That
    /// location (resolved against the request URL) is fetched with a second
    /// request and streamed to `dest`. When the endpoint serves the content
    /// itself, that response is streamed directly.
    ///
    /// `dest` is truncated first. On failure a partially written file is left
    /// in place.
    ///
    /// # Errors
    /// - [`Error::Remote`] if either request answers with a non-success status
    /// - [`Error::InvalidUrl`] if the redirect location cannot be parsed
    /// - [`Error::Network`] on transport failure
    /// - [`Error::PathIo`] if `dest` cannot be written
    pub async fn download_item(&self, item_id: &str, dest: &Path) -> Result<DownloadedFile> {
        let mut url = self.endpoint(&["content", "items", item_id, "data"])?;
        url.query_pairs_mut().append_pair("token", &self.token);

        let mut response = self.http.get(url).send().await?;
        if response.status().is_redirection() {
            let location = redirect_target(&response)?;
            tracing::debug!(
                item_id,
                host = location.host_str().unwrap_or_default(),
                "data endpoint redirected to storage"
            );
            response = self.http.get(location).send().await?;
        }

        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "Problem downloading item {}: HTTP {}",
                item_id,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::path_io(dest, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::path_io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::path_io(dest, e))?;
        drop(file);

        let size = tokio::fs::metadata(dest)
            .await
            .map_err(|e| Error::path_io(dest, e))?
            .len();

        tracing::debug!(item_id, bytes = written, path = %dest.display(), "download finished");

        Ok(DownloadedFile {
            path: dest.to_path_buf(),
            size,
        })
    }

    /// Delete an item owned by this account
    ///
    /// # Errors
    /// - [`Error::Remote`] if the portal does not confirm the deletion
    /// - [`Error::Network`] on transport failure
    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        let url = self.endpoint(&["content", "users", self.username.as_str(), "items", item_id, "delete"])?;
        tracing::debug!(item_id, "deleting item");

        let response = self
            .http
            .post(url)
            .form(&[("token", self.token.as_str()), ("f", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Remote(format!(
                "Problem deleting item {} in ArcGIS Online: HTTP {}",
                item_id,
                response.status()
            )));
        }

        let body: DeleteResponse = read_portal_json(response, "delete").await?;
        if !body.success {
            return Err(Error::Remote(format!(
                "Problem deleting item {} in ArcGIS Online",
                item_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStatusSource for PortalClient {
    async fn job_status(&self, job: &ExportJob) -> Result<JobStatusResponse> {
        self.get_job_status(job).await
    }
}

/// Absolute target of a redirect response
fn redirect_target(response: &reqwest::Response) -> Result<Url> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            Error::Remote(format!(
                "redirect ({}) without a usable Location header",
                response.status()
            ))
        })?;
    Ok(response.url().join(location)?)
}

/// Decode a portal JSON response, surfacing `{"error": {...}}` payloads
///
/// The portal reports most failures with HTTP 200 and an error object, so the
/// payload is checked before it is decoded into `T`.
async fn read_portal_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) if !status.is_success() => {
            return Err(Error::Remote(format!("{}: HTTP {}", context, status)));
        }
        Err(e) => return Err(Error::Serialization(e)),
    };

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown portal error");
        return Err(Error::Remote(format!("{}: {}", context, message)));
    }

    if !status.is_success() {
        return Err(Error::Remote(format!("{}: HTTP {}", context, status)));
    }

    Ok(serde_json::from_value(value)?)
}
