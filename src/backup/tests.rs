use super::*;
use crate::clock::ManualClock;
use crate::error::Error;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const START_MILLIS: i64 = 1_700_000_000_000;

/// Portal that exports item `abc` into export item `exp1`
struct FakePortal {
    server: MockServer,
}

impl FakePortal {
    async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/content/items/abc"))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abc",
                "owner": "gis_admin",
                "title": "Parcels",
                "type": "Feature Service"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/content/items/exp1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "exp1",
                "owner": "gis_admin",
                "title": "1700000000000_abc",
                "type": "File Geodatabase"
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    async fn expect_export(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/content/users/gis_admin/export"))
            .and(body_string_contains("itemId=abc"))
            .and(body_string_contains("title=1700000000000_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobId": "job-1",
                "exportItemId": "exp1"
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Report `pending` this many times, then `completed`
    async fn statuses(&self, pending: u64) {
        if pending > 0 {
            Mock::given(method("GET"))
                .and(path("/content/users/gis_admin/items/exp1/status"))
                .and(query_param("jobId", "job-1"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "status": "pending" })),
                )
                .up_to_n_times(pending)
                .expect(pending)
                .mount(&self.server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/content/users/gis_admin/items/exp1/status"))
            .and(query_param("jobId", "job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "itemId": "exp1"
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    async fn archive_bytes(&self, size: usize) {
        Mock::given(method("GET"))
            .and(path("/content/items/exp1/data"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/storage/signed/exp1.zip"),
            )
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/signed/exp1.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; size]))
            .mount(&self.server)
            .await;
    }

    async fn expect_delete(&self, success: bool, times: u64) {
        Mock::given(method("POST"))
            .and(path("/content/users/gis_admin/items/exp1/delete"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": success })),
            )
            .expect(times)
            .mount(&self.server)
            .await;
    }

    fn backup(&self, working_dir: &Path, clock: ManualClock) -> ItemBackup<ManualClock> {
        let target = BackupTarget::new("abc", working_dir, "gis_admin", "secret").unwrap();
        let config = Config {
            portal_url: self.server.uri(),
            ..Default::default()
        };
        ItemBackup::with_clock(target, config, clock).unwrap()
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn first_run_promotes_and_creates_item_dir() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    portal.statuses(2).await;
    portal.archive_bytes(2048).await;
    portal.expect_delete(true, 1).await;

    let work = TempDir::new().unwrap();
    let clock = ManualClock::new(START_MILLIS);
    let mut backup = portal.backup(work.path(), clock.clone());

    let result = backup.run().await.unwrap();

    assert!(!result.duplicate);
    assert_eq!(result.item_details.title, "Parcels");
    let filename = result.filename.clone().unwrap();
    assert_eq!(
        filename,
        work.path().join("archive/abc/1700000003000.zip")
    );
    assert_eq!(std::fs::metadata(&filename).unwrap().len(), 2048);
    assert!(!work.path().join("archive/tmp/abc.zip").exists());
    assert!(work.path().join("archive/tmp").is_dir());
    assert_eq!(backup.stage(), Stage::Promoted);

    // Three status checks, each preceded by one poll interval
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);
    assert_eq!(
        result.summary(),
        format!("Parcels completed: {}", filename.display())
    );
}

#[tokio::test]
async fn download_within_threshold_is_discarded() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    portal.statuses(0).await;
    portal.archive_bytes(1050).await;
    portal.expect_delete(true, 1).await;

    let work = TempDir::new().unwrap();
    let item_dir = work.path().join("archive/abc");
    std::fs::create_dir_all(&item_dir).unwrap();
    std::fs::write(item_dir.join("1600000000000.zip"), vec![0u8; 1000]).unwrap();

    let mut backup = portal.backup(work.path(), ManualClock::new(START_MILLIS));
    let result = backup.run().await.unwrap();

    assert!(result.duplicate);
    assert_eq!(result.filename, None);
    assert_eq!(result.summary(), "No updates to Parcels.");
    assert_eq!(entries(&item_dir), vec!["1600000000000.zip"]);
    assert!(!work.path().join("archive/tmp/abc.zip").exists());
    assert_eq!(backup.stage(), Stage::DiscardedDuplicate);
}

#[tokio::test]
async fn download_outside_threshold_adds_one_newer_entry() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    portal.statuses(1).await;
    portal.archive_bytes(1150).await;
    portal.expect_delete(true, 1).await;

    let work = TempDir::new().unwrap();
    let item_dir = work.path().join("archive/abc");
    std::fs::create_dir_all(&item_dir).unwrap();
    std::fs::write(item_dir.join("1600000000000.zip"), vec![0u8; 1000]).unwrap();
    std::fs::write(item_dir.join("1650000000000.zip"), vec![0u8; 1000]).unwrap();

    let mut backup = portal.backup(work.path(), ManualClock::new(START_MILLIS));
    let result = backup.run().await.unwrap();

    assert!(!result.duplicate);
    let names = entries(&item_dir);
    assert_eq!(names.len(), 3);
    let newest = names.last().unwrap();
    assert_eq!(
        result.filename.unwrap().file_name().unwrap().to_str().unwrap(),
        newest
    );
    assert!(newest.as_str() > "1650000000000.zip");
}

#[tokio::test]
async fn threshold_comes_from_config() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    portal.statuses(0).await;
    portal.archive_bytes(1150).await;
    portal.expect_delete(true, 1).await;

    let work = TempDir::new().unwrap();
    let item_dir = work.path().join("archive/abc");
    std::fs::create_dir_all(&item_dir).unwrap();
    std::fs::write(item_dir.join("1600000000000.zip"), vec![0u8; 1000]).unwrap();

    let target = BackupTarget::new("abc", work.path(), "gis_admin", "secret").unwrap();
    let mut config = Config {
        portal_url: portal.server.uri(),
        ..Default::default()
    };
    config.archive.size_threshold = 500;
    let mut backup =
        ItemBackup::with_clock(target, config, ManualClock::new(START_MILLIS)).unwrap();

    assert!(backup.run().await.unwrap().duplicate);
}

#[tokio::test]
async fn item_lookup_failure_stops_before_export() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/content/items/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": { "code": 400, "message": "Item does not exist or is inaccessible." }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let portal = FakePortal { server };

    let work = TempDir::new().unwrap();
    let mut backup = portal.backup(work.path(), ManualClock::new(START_MILLIS));
    let err = backup.run().await.unwrap_err();

    match err {
        Error::Remote(msg) => assert!(msg.contains("Item does not exist")),
        other => panic!("expected Remote error, got {other:?}"),
    }
    assert_eq!(backup.stage(), Stage::DirectoriesEnsured);
    assert!(work.path().join("archive/tmp").is_dir());
}

#[tokio::test]
async fn delete_failure_is_fatal_and_leaves_temp_file() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    portal.statuses(0).await;
    portal.archive_bytes(512).await;
    portal.expect_delete(false, 1).await;

    let work = TempDir::new().unwrap();
    let mut backup = portal.backup(work.path(), ManualClock::new(START_MILLIS));
    let err = backup.run().await.unwrap_err();

    assert_eq!(err.kind(), "remote_error");
    assert_eq!(backup.stage(), Stage::Downloaded);
    assert!(work.path().join("archive/tmp/abc.zip").exists());
    assert!(!work.path().join("archive/abc").exists());
}

#[tokio::test]
async fn failed_download_still_deletes_export_item() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    portal.statuses(0).await;
    Mock::given(method("GET"))
        .and(path("/content/items/exp1/data"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&portal.server)
        .await;
    portal.expect_delete(true, 1).await;

    let work = TempDir::new().unwrap();
    let mut backup = portal.backup(work.path(), ManualClock::new(START_MILLIS));
    let err = backup.run().await.unwrap_err();

    assert_eq!(err.kind(), "remote_error");
    assert_eq!(backup.stage(), Stage::ExportItemInspected);
}

#[tokio::test]
async fn export_item_id_falls_back_to_export_response() {
    let portal = FakePortal::start().await;
    portal.expect_export(1).await;
    Mock::given(method("GET"))
        .and(path("/content/users/gis_admin/items/exp1/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "completed" })),
        )
        .expect(1)
        .mount(&portal.server)
        .await;
    portal.archive_bytes(64).await;
    portal.expect_delete(true, 1).await;

    let work = TempDir::new().unwrap();
    let mut backup = portal.backup(work.path(), ManualClock::new(START_MILLIS));
    let result = backup.run().await.unwrap();

    assert!(result.filename.is_some());
}

#[test]
fn export_title_combines_time_and_item() {
    let item = ItemId::parse("abc").unwrap();
    assert_eq!(export_title(1_700_000_000_000, &item), "1700000000000_abc");
}

#[test]
fn invalid_config_is_rejected_before_any_request() {
    let target = BackupTarget::new("abc", "/tmp/work", "gis_admin", "secret").unwrap();
    let config = Config {
        portal_url: "::not a url::".into(),
        ..Default::default()
    };
    let err = ItemBackup::new(target, config).err().unwrap();
    assert!(err.is_config());
}
