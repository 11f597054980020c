//! Worker state machine: drain bound, failures, output modes.

use std::sync::Arc;
use std::time::Duration;

use document_builder::BuilderRegistry;
use ingest_common::WorkItem;
use ingestion::{IngestionError, OutputMode, Worker, WorkerConfig};
use storage::{MemoryStore, WorkQueue};
use test_utils::{
    epochs, json_files, obs_descriptor_json, obs_rows, temp_test_dir, write_ndjson,
    OBS_DESCRIPTOR_ID,
};
use tokio::time::Instant;

fn worker(queue: &WorkQueue, store: &MemoryStore, config: WorkerConfig) -> Worker {
    Worker::new(
        0,
        queue.clone(),
        Arc::new(store.clone()),
        Arc::new(BuilderRegistry::with_defaults()),
        Arc::new(config),
    )
}

/// Memory store holding the obs descriptor, pointed at a fresh record file.
fn seeded_store(dir: &std::path::Path) -> MemoryStore {
    let path = write_ndjson(dir, "metar.ndjson", &obs_rows(3, epochs::VALID_12Z));
    let store = MemoryStore::new();
    store.insert(
        OBS_DESCRIPTOR_ID,
        obs_descriptor_json(Some(path.to_str().unwrap())),
    );
    store
}

// ============================================================================
// Drain bound
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_queue_disconnects_after_three_polls() {
    let queue = WorkQueue::new();
    let store = MemoryStore::new();
    let start = Instant::now();

    let summary = worker(&queue, &store, WorkerConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.drain_polls, 3);
    assert_eq!(summary.items_processed, 0);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_item_during_drain_resumes_processing() {
    let dir = temp_test_dir();
    let store = seeded_store(dir.path());
    let queue = WorkQueue::new();

    let handle = tokio::spawn(worker(&queue, &store, WorkerConfig::default()).run());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    queue.put(WorkItem::descriptor(OBS_DESCRIPTOR_ID));

    let summary = handle.await.unwrap().unwrap();
    queue.join().await;

    assert_eq!(summary.items_processed, 1);
    assert_eq!(summary.documents_built, 1);
    // Two pauses before the item, the full bound after it.
    assert_eq!(summary.drain_polls, 5);
    assert!(store
        .document(&format!("DD:V01:METAR:obs:{}", epochs::VALID_12Z))
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_custom_drain_bound() {
    let config = WorkerConfig {
        drain_max_polls: 1,
        drain_pause: Duration::from_millis(250),
        ..Default::default()
    };
    let summary = worker(&WorkQueue::new(), &MemoryStore::new(), config)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.drain_polls, 1);
}

// ============================================================================
// Failures are not drain signals
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_items_complete_without_draining() {
    let queue = WorkQueue::new();
    queue.put(WorkItem::descriptor("MD:V01:MISSING"));
    queue.put(WorkItem::source("/nonexistent/metar.ndjson"));
    queue.put(WorkItem::descriptor("MD:V01:MISSING"));

    let summary = worker(&queue, &MemoryStore::new(), WorkerConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.items_failed, 3);
    assert_eq!(summary.items_processed, 0);
    assert_eq!(summary.drain_polls, 3);
    assert_eq!(queue.completed(), 3);
    assert_eq!(queue.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_descriptor_fails_item_only() {
    let store = MemoryStore::new();
    store.insert("MD:BROKEN", serde_json::json!({"id": "MD:BROKEN"}));
    let queue = WorkQueue::new();
    queue.put(WorkItem::descriptor("MD:BROKEN"));

    let summary = worker(&queue, &store, WorkerConfig::default())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.items_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_job_descriptor_is_worker_fatal() {
    let queue = WorkQueue::new();
    queue.put(WorkItem::source("/data/metar.ndjson"));
    let config = WorkerConfig {
        job_descriptor: Some("MD:V01:MISSING".to_string()),
        ..Default::default()
    };

    let err = worker(&queue, &MemoryStore::new(), config)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::DescriptorNotFound(id) if id == "MD:V01:MISSING"));
    assert_eq!(queue.pending(), 1);
}

// ============================================================================
// Output modes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_file_output_with_job_descriptor() {
    let dir = temp_test_dir();
    let store = seeded_store(dir.path());
    let out = dir.path().join("out");
    let source = write_ndjson(dir.path(), "late.ndjson", &obs_rows(2, epochs::VALID_13Z));

    let queue = WorkQueue::new();
    queue.put(WorkItem::source(&source));
    let config = WorkerConfig {
        job_descriptor: Some(OBS_DESCRIPTOR_ID.to_string()),
        output: OutputMode::File(out.clone()),
        ..Default::default()
    };

    let summary = worker(&queue, &store, config).run().await.unwrap();

    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.persist.write_calls, 0);
    let files = json_files(&out);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("late.ndjson.json"));

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&files[0]).unwrap()).unwrap();
    let docs = written.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(
        docs[0]["id"],
        format!("DD:V01:METAR:obs:{}", epochs::VALID_13Z)
    );
    // Only the descriptor is in the store; file mode writes nothing there.
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_store_output_records_persist_report() {
    let dir = temp_test_dir();
    let store = seeded_store(dir.path());
    let queue = WorkQueue::new();
    queue.put(WorkItem::descriptor(OBS_DESCRIPTOR_ID));

    let summary = worker(&queue, &store, WorkerConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.persist.write_calls, 1);
    assert_eq!(summary.persist.written, 1);
    assert_eq!(store.len(), 2);
}
