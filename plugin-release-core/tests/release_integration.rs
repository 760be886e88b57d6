use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use plugin_release_core::config::ReleaseConfig;
use plugin_release_core::contract::{ArtifactStore, MockArtifactStore, UploadError, UploadReceipt};
use plugin_release_core::error::ReleaseError;
use plugin_release_core::manifest::Manifest;
use plugin_release_core::release::{release, release_keys};

const LATEST: &str = "elastic/timelion-extras/timelion-extras-latest.tar.gz";
const PINNED: &str = "elastic/timelion-extras/timelion-extras-1.2.0.tar.gz";

fn keys() -> Vec<String> {
    vec![LATEST.to_string(), PINNED.to_string()]
}

fn archive() -> (tempfile::TempDir, std::path::PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("timelion-extras-1.2.0.tar.gz");
    std::fs::write(&path, b"not really gzip").unwrap();
    (temp, path)
}

/// Store whose uploads take a scripted time and optionally fail.
struct ScriptedStore {
    delays: HashMap<String, Duration>,
    failing: Option<String>,
    finished: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStore {
    fn new(delays: &[(&str, u64)], failing: Option<&str>) -> Self {
        Self {
            delays: delays
                .iter()
                .map(|(key, ms)| (key.to_string(), Duration::from_millis(*ms)))
                .collect(),
            failing: failing.map(str::to_string),
            finished: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ArtifactStore for ScriptedStore {
    fn bucket(&self) -> String {
        "scripted".to_string()
    }

    async fn put_object(&self, key: &str, _body: Bytes) -> Result<UploadReceipt, UploadError> {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.as_deref() == Some(key) {
            return Err("access denied".into());
        }
        self.finished.lock().unwrap().push(key.to_string());
        Ok(UploadReceipt {
            key: key.to_string(),
            location: format!("scripted://{key}"),
            e_tag: None,
        })
    }
}

#[test]
fn test_release_keys_are_latest_alias_then_pinned_version() {
    let manifest = Manifest::parse(
        r#"{"name": "timelion-extras", "version": "1.2.0"}"#,
        std::path::Path::new("package.json"),
    )
    .unwrap();

    assert_eq!(release_keys(&ReleaseConfig::default(), &manifest), keys());
}

#[tokio::test]
async fn test_release_uploads_identical_body_to_both_keys() {
    let (_temp, path) = archive();
    let seen: Arc<Mutex<Vec<(String, Bytes)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut store = MockArtifactStore::new();
    store
        .expect_bucket()
        .return_const("download.elasticsearch.org".to_string());
    let record = Arc::clone(&seen);
    store
        .expect_put_object()
        .times(2)
        .returning(move |key: &str, body: Bytes| {
            record.lock().unwrap().push((key.to_string(), body));
            Ok(UploadReceipt {
                key: key.to_string(),
                location: format!("https://s3.amazonaws.com/download.elasticsearch.org/{key}"),
                e_tag: Some("\"etag\"".to_string()),
            })
        });

    let report = release(Arc::new(store), &path, &keys(), None).await.unwrap();

    assert_eq!(report.bucket, "download.elasticsearch.org");
    assert_eq!(report.receipts.len(), 2);
    let mut uploaded: Vec<String> = seen.lock().unwrap().iter().map(|(k, _)| k.clone()).collect();
    uploaded.sort();
    let mut expected = keys();
    expected.sort();
    assert_eq!(uploaded, expected);
    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .all(|(_, body)| body.as_ref() == b"not really gzip"));
}

#[tokio::test]
async fn test_release_waits_for_slowest_upload() {
    let (_temp, path) = archive();
    let store = ScriptedStore::new(&[(LATEST, 20), (PINNED, 250)], None);
    let finished = Arc::clone(&store.finished);

    let started = Instant::now();
    let report = release(Arc::new(store), &path, &keys(), Some(Duration::from_secs(10)))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(report.receipts.len(), 2);
    assert_eq!(*finished.lock().unwrap(), keys());
}

#[tokio::test]
async fn test_release_failure_aborts_sibling_upload() {
    let (_temp, path) = archive();
    let store = ScriptedStore::new(&[(PINNED, 1_000)], Some(LATEST));
    let finished = Arc::clone(&store.finished);

    let started = Instant::now();
    let err = release(Arc::new(store), &path, &keys(), None)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(900));
    match err {
        ReleaseError::Upload { key, published, .. } => {
            assert_eq!(key, LATEST);
            assert!(published.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(finished.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_release_reports_published_keys_on_late_failure() {
    let (_temp, path) = archive();
    let store = ScriptedStore::new(&[(PINNED, 200)], Some(PINNED));

    let err = release(Arc::new(store), &path, &keys(), None)
        .await
        .unwrap_err();

    match err {
        ReleaseError::Upload { key, published, .. } => {
            assert_eq!(key, PINNED);
            assert_eq!(published, vec![LATEST.to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_release_times_out_when_store_hangs() {
    let (_temp, path) = archive();
    let store = ScriptedStore::new(&[(LATEST, 5_000), (PINNED, 5_000)], None);

    let err = release(
        Arc::new(store),
        &path,
        &keys(),
        Some(Duration::from_millis(100)),
    )
    .await
    .unwrap_err();

    match err {
        ReleaseError::TimedOut {
            limit,
            pending,
            published,
        } => {
            assert_eq!(limit, Duration::from_millis(100));
            assert_eq!(pending, keys());
            assert!(published.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_release_missing_archive_uploads_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let mut store = MockArtifactStore::new();
    store.expect_put_object().never();

    let err = release(
        Arc::new(store),
        &temp.path().join("missing.tar.gz"),
        &keys(),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ReleaseError::Read { .. }), "{err:?}");
}
