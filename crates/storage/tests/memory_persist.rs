//! Gateway against the in-memory store.

use ingest_common::DocumentMap;
use std::time::Duration;
use storage::{MemoryStore, PersistConfig, PersistenceGateway, StoreConnector};
use test_utils::documents;

fn document_map(count: usize) -> DocumentMap {
    documents(count).into_iter().collect()
}

#[tokio::test]
async fn test_persist_chunks_into_memory_store() {
    let store = MemoryStore::new();
    let mut conn = store.connect().await.unwrap();
    let gateway = PersistenceGateway::new(PersistConfig {
        chunk_size: 4,
        retry_pause: Duration::from_millis(10),
    });

    let report = gateway.persist(conn.as_mut(), &document_map(10)).await;

    assert_eq!(report.chunks, 3);
    assert_eq!(report.write_calls, 3);
    assert_eq!(report.written, 10);
    assert_eq!(store.len(), 10);
    assert_eq!(store.document("DD:TEST:7").unwrap()["value"], 7);
}

#[tokio::test]
async fn test_upsert_overwrites_existing_document() {
    let store = MemoryStore::new();
    store.insert("DD:TEST:0", serde_json::json!({"stale": true}));
    let mut conn = store.connect().await.unwrap();

    PersistenceGateway::default()
        .persist(conn.as_mut(), &document_map(1))
        .await;

    let doc = store.document("DD:TEST:0").unwrap();
    assert!(doc.get("stale").is_none());
    assert_eq!(doc["id"], "DD:TEST:0");
}

#[test]
fn test_zero_chunk_size_clamped() {
    let gateway = PersistenceGateway::new(PersistConfig {
        chunk_size: 0,
        retry_pause: Duration::ZERO,
    });
    assert_eq!(gateway.config().chunk_size, 1);
}
