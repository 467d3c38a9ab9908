//! Common test utilities for arcgis-item-backup end-to-end tests

use std::path::Path;
use std::time::Duration;

use arcgis_item_backup::{BackupTarget, Config};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Item id used by every fixture
pub const ITEM_ID: &str = "c31146ae5a7d4299a08dd4407526625d";
/// Temporary export item id
pub const EXPORT_ITEM_ID: &str = "e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0e0";
/// Portal account
pub const USERNAME: &str = "gis_admin";

/// Mount a portal that exports [`ITEM_ID`] into an archive of `archive_size` bytes
///
/// The delete endpoint must be called exactly once.
pub async fn mount_portal(server: &MockServer, archive_size: usize) {
    Mock::given(method("GET"))
        .and(path(format!("/content/items/{ITEM_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": ITEM_ID,
            "owner": USERNAME,
            "title": "Hydrants",
            "type": "Feature Service"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/content/users/{USERNAME}/export")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jobId": "job-42",
            "exportItemId": EXPORT_ITEM_ID
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/content/users/{USERNAME}/items/{EXPORT_ITEM_ID}/status"
        )))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "processing" })),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/content/users/{USERNAME}/items/{EXPORT_ITEM_ID}/status"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "completed",
            "itemId": EXPORT_ITEM_ID
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/content/items/{EXPORT_ITEM_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": EXPORT_ITEM_ID,
            "owner": USERNAME,
            "title": "export",
            "type": "File Geodatabase"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/content/items/{EXPORT_ITEM_ID}/data")))
        .respond_with(ResponseTemplate::new(302).insert_header(
            "Location",
            format!("{}/signed/{EXPORT_ITEM_ID}.zip?X-Amz-Signature=abc", server.uri()).as_str(),
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/signed/{EXPORT_ITEM_ID}.zip")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'z'; archive_size]))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!(
            "/content/users/{USERNAME}/items/{EXPORT_ITEM_ID}/delete"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true })))
        .expect(1)
        .mount(server)
        .await;
}

/// Target for [`ITEM_ID`] in `working_dir`
pub fn target(working_dir: &Path) -> BackupTarget {
    BackupTarget::new(ITEM_ID, working_dir, USERNAME, "test-token").unwrap()
}

/// Config pointing at `server` with a fast poll interval
pub fn config(server: &MockServer) -> Config {
    let mut config = Config {
        portal_url: server.uri(),
        ..Default::default()
    };
    config.poll.interval = Duration::from_millis(10);
    config
}
