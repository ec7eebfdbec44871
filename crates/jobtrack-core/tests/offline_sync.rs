//! Integration tests for offline writes and queue reconciliation

use std::sync::Arc;

use jobtrack_core::remote::UnavailableBackend;
use jobtrack_core::storage::NewQueueEntry;
use jobtrack_core::{
    Config, Connectivity, EntityType, MemoryBackend, MutationKind, RemoteBackend, Row, Tracker,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn create_tracker(connectivity: Connectivity) -> (Tracker, Arc<MemoryBackend>) {
    let remote = Arc::new(MemoryBackend::new().unwrap());
    let tracker =
        Tracker::open_in_memory(Config::default(), remote.clone(), connectivity).unwrap();
    (tracker, remote)
}

#[tokio::test]
async fn test_offline_save_then_reconnect_drains_once() {
    let (tracker, remote) = create_tracker(Connectivity::Offline);

    let saved = tracker
        .save_row(EntityType::Company, row(json!({"name": "Initech"})))
        .await
        .unwrap();
    let id = saved["id"].as_str().unwrap().to_string();
    assert_eq!(tracker.status().pending_operations, 1);
    assert_eq!(remote.request_count(), 0);

    let report = tracker.set_online(true).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(remote.request_count(), 1);
    assert_eq!(tracker.pending_operations().unwrap(), 0);
    assert_eq!(tracker.status().network_status(), "Online");
    assert!(tracker.status().last_sync_at.is_some());

    let remote_row = remote.store().get(EntityType::Company, &id).unwrap().unwrap();
    assert_eq!(remote_row["name"], json!("Initech"));

    // Already online: no second drain
    assert!(tracker.set_online(true).await.is_none());
    assert_eq!(remote.request_count(), 1);
}

#[tokio::test]
async fn test_queue_replays_in_timestamp_order() {
    let (tracker, remote) = create_tracker(Connectivity::Offline);
    let store = tracker.store();

    // Appended out of order: the delete is stamped after the create
    store
        .enqueue(&NewQueueEntry {
            kind: MutationKind::Delete,
            entity: EntityType::Contact,
            payload: row(json!({"id": "d1"})),
            timestamp: 2_000,
        })
        .unwrap();
    store
        .enqueue(&NewQueueEntry {
            kind: MutationKind::Create,
            entity: EntityType::Contact,
            payload: row(json!({"id": "d1", "name": "Sam"})),
            timestamp: 1_000,
        })
        .unwrap();

    let report = tracker.set_online(true).await.unwrap();
    assert_eq!(report.applied, 2);

    let actions: Vec<&'static str> = remote
        .requests()
        .iter()
        .map(|d| d.action.name())
        .collect();
    assert_eq!(actions, vec!["upsert", "delete"]);
    assert!(remote.store().get(EntityType::Contact, "d1").unwrap().is_none());
}

#[tokio::test]
async fn test_empty_queue_makes_no_remote_calls() {
    let (tracker, remote) = create_tracker(Connectivity::Online);

    let report = tracker.sync_pending().await.unwrap();
    assert_eq!(report.applied, 0);
    assert!(!report.skipped);
    assert_eq!(remote.request_count(), 0);
}

#[tokio::test]
async fn test_failed_replay_keeps_entries() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::with_data_dir(temp_dir.path());
    let remote: Arc<dyn RemoteBackend> = Arc::new(UnavailableBackend);
    let tracker = Tracker::open_with_remote(config, remote, Connectivity::Offline).unwrap();

    tracker
        .save_row(EntityType::Company, row(json!({"name": "Acme"})))
        .await
        .unwrap();
    tracker
        .save_row(EntityType::Company, row(json!({"name": "Globex"})))
        .await
        .unwrap();

    let report = tracker.set_online(true).await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(tracker.pending_operations().unwrap(), 2);
    assert_eq!(tracker.status().pending_operations, 2);
}

#[tokio::test]
async fn test_queue_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let remote: Arc<dyn RemoteBackend> = Arc::new(UnavailableBackend);
        let tracker = Tracker::open_with_remote(
            Config::with_data_dir(temp_dir.path()),
            remote,
            Connectivity::Offline,
        )
        .unwrap();
        tracker
            .save_row(EntityType::Contact, row(json!({"id": "d1", "name": "Sam"})))
            .await
            .unwrap();
    }

    let remote = Arc::new(MemoryBackend::new().unwrap());
    let tracker = Tracker::open_with_remote(
        Config::with_data_dir(temp_dir.path()),
        remote.clone(),
        Connectivity::Offline,
    )
    .unwrap();
    assert_eq!(tracker.status().pending_operations, 1);

    tracker.set_online(true).await.unwrap();
    assert!(remote.store().get(EntityType::Contact, "d1").unwrap().is_some());
}

#[tokio::test]
async fn test_initialize_warms_cache_and_drains() {
    let (tracker, remote) = create_tracker(Connectivity::Online);
    remote
        .store()
        .put(EntityType::Company, &row(json!({"id": "c1", "name": "Remote Co"})))
        .unwrap();

    let report = tracker.initialize().await.unwrap();
    assert_eq!(report.applied, 0);
    assert!(tracker.store().get(EntityType::Company, "c1").unwrap().is_some());
}

#[tokio::test]
async fn test_reset_discards_local_state() {
    let temp_dir = TempDir::new().unwrap();
    let remote: Arc<dyn RemoteBackend> = Arc::new(UnavailableBackend);
    let tracker = Tracker::open_with_remote(
        Config::with_data_dir(temp_dir.path()),
        remote,
        Connectivity::Offline,
    )
    .unwrap();
    tracker
        .save_row(EntityType::JobApplication, row(json!({"title": "Engineer"})))
        .await
        .unwrap();

    assert!(tracker.reset_local_store());
    assert_eq!(tracker.pending_operations().unwrap(), 0);
    assert!(tracker
        .store()
        .get_all(EntityType::JobApplication)
        .unwrap()
        .is_empty());

    // The store stays usable after a reset
    tracker
        .save_row(EntityType::JobApplication, row(json!({"title": "Engineer"})))
        .await
        .unwrap();
    assert_eq!(tracker.pending_operations().unwrap(), 1);
}
