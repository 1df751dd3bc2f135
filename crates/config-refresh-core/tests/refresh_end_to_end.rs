//! End-to-end coverage of the public API: a coordinator fed by a JSON file
//! and by the in-memory source, driven the way an embedder would.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use config_refresh_core::{
    ConfigEntry, CoordinatorConfig, CountingTelemetry, FetchError, FileSource, InMemorySource,
    InitialLoad, LabelFilter, RefreshCoordinator, RefreshError, RefreshOutcome, RefreshPhase,
    SentinelRegistration, SourceDocument, StartupPolicy,
};
use tempfile::NamedTempFile;

fn write_document(file: &mut NamedTempFile, entries: Vec<ConfigEntry>) {
    let document = SourceDocument { entries };
    let raw = serde_json::to_vec(&document).expect("serialize document");
    let handle = file.as_file_mut();
    handle.set_len(0).expect("truncate");
    std::io::Seek::rewind(handle).expect("rewind");
    handle.write_all(&raw).expect("write document");
    handle.flush().expect("flush");
}

fn document(sentinel: &str, greeting: &str) -> Vec<ConfigEntry> {
    vec![
        ConfigEntry::new("Sentinel", sentinel, ""),
        ConfigEntry::new("SomeRandomConfiguration", greeting, ""),
        ConfigEntry::new("SomeRandomConfiguration", "prod-value", "production"),
        ConfigEntry::feature_flag_entry("Beta", true, ""),
    ]
}

#[tokio::test]
async fn file_backed_coordinator_follows_the_sentinel() {
    let mut file = NamedTempFile::new().expect("temp file");
    write_document(&mut file, document("1", "hello"));

    let coordinator = RefreshCoordinator::new(
        Arc::new(FileSource::new(file.path())),
        CoordinatorConfig::with_sentinel("Sentinel", ""),
    );
    let loaded = coordinator.initialize().await.expect("initial load");
    assert_eq!(
        loaded,
        InitialLoad::Loaded {
            version: 1,
            entries: 4
        }
    );

    let store = coordinator.store();
    assert_eq!(
        store.resolve("SomeRandomConfiguration", ["production", ""]),
        Some("prod-value".to_string())
    );
    assert_eq!(
        store.resolve("SomeRandomConfiguration", ["staging", ""]),
        Some("hello".to_string())
    );
    assert!(store.is_feature_enabled("Beta", ""));

    // Editing a value without bumping the sentinel is not picked up.
    let mut edited = document("1", "ignored");
    edited.pop();
    write_document(&mut file, edited);
    assert_eq!(
        coordinator.try_refresh_once().await.expect("refresh"),
        RefreshOutcome::Unchanged
    );
    assert_eq!(
        store.get("SomeRandomConfiguration", "").as_deref(),
        Ok("hello")
    );

    write_document(&mut file, document("2", "world"));
    assert!(coordinator
        .try_refresh_once()
        .await
        .expect("refresh")
        .is_changed());
    assert_eq!(
        store.get("SomeRandomConfiguration", "").as_deref(),
        Ok("world")
    );
    assert_eq!(coordinator.phase().await, RefreshPhase::Idle);
}

#[tokio::test]
async fn label_filter_limits_the_snapshot() {
    let mut file = NamedTempFile::new().expect("temp file");
    write_document(&mut file, document("1", "hello"));

    let config = CoordinatorConfig {
        label_filter: LabelFilter::Exact("production".into()),
        ..CoordinatorConfig::with_sentinel("Sentinel", "")
    };
    let coordinator = RefreshCoordinator::new(Arc::new(FileSource::new(file.path())), config);
    coordinator.initialize().await.expect("initial load");

    let snapshot = coordinator.store().load();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot.get("SomeRandomConfiguration", "production"),
        Some("prod-value")
    );
    assert_eq!(snapshot.get("SomeRandomConfiguration", ""), None);
}

#[tokio::test]
async fn broken_document_keeps_previous_snapshot() {
    let mut file = NamedTempFile::new().expect("temp file");
    write_document(&mut file, document("1", "hello"));
    let coordinator = RefreshCoordinator::new(
        Arc::new(FileSource::new(file.path())),
        CoordinatorConfig::with_sentinel("Sentinel", ""),
    );
    coordinator.initialize().await.expect("initial load");

    let handle = file.as_file_mut();
    handle.set_len(0).expect("truncate");
    std::io::Seek::rewind(handle).expect("rewind");
    handle.write_all(b"{ not json").expect("write");
    handle.flush().expect("flush");

    let err = coordinator.try_refresh_once().await.unwrap_err();
    assert!(matches!(err, RefreshError::Fetch(FetchError::Json(_))));
    assert_eq!(coordinator.store().version(), 1);
    let status = coordinator.status_handle().to_json().await;
    assert_eq!(status["lastOutcome"], "failed");
    assert_eq!(status["snapshotVersion"], 1);
}

#[tokio::test]
async fn missing_source_file_fails_required_startup() {
    let dir = tempfile::tempdir().expect("temp dir");
    let coordinator = RefreshCoordinator::new(
        Arc::new(FileSource::new(dir.path().join("absent.json"))),
        CoordinatorConfig::with_sentinel("Sentinel", ""),
    );
    let err = coordinator.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        RefreshError::Startup {
            attempts: 1,
            ref source
        } if matches!(**source, RefreshError::Fetch(FetchError::Io(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn background_loop_serves_readers_during_refresh() {
    let source = Arc::new(InMemorySource::with_entries(document("1", "hello")));
    let config = CoordinatorConfig {
        sentinels: vec![
            SentinelRegistration::new("Sentinel", "").with_cache_expiration(Duration::from_secs(2))
        ],
        tick_interval: Duration::from_secs(1),
        startup_policy: StartupPolicy::Optional,
        ..CoordinatorConfig::default()
    };
    let coordinator = RefreshCoordinator::new(source.clone(), config);
    let telemetry = CountingTelemetry::default();
    coordinator.set_telemetry(Arc::new(telemetry.clone())).await;
    coordinator.initialize().await.expect("initial load");
    assert!(coordinator.start().await);

    source.set_fetch_all_delay(Duration::from_millis(500));
    source.replace_all(document("2", "world"));

    // Readers keep seeing v1 until the slow fetch completes.
    let store = coordinator.store();
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert_eq!(
        store.get("SomeRandomConfiguration", "").as_deref(),
        Ok("hello")
    );
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        store.get("SomeRandomConfiguration", "").as_deref(),
        Ok("world")
    );

    coordinator.stop().await;
    let counts = telemetry.snapshot();
    assert_eq!(counts.refresh_changed, 2);
    assert_eq!(counts.last_version, 2);
    assert!(counts.tick_skipped >= 1);
}
