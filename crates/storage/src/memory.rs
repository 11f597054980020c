//! In-process document store.
//!
//! Every clone shares the same map, so a `MemoryStore` doubles as its own
//! connector: each connection is a clone with its own open/closed state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::store::{BulkOutcome, DocumentStore, StoreConnector, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `document` under `id` directly, e.g. to seed descriptors.
    pub fn insert(&self, id: impl Into<String>, document: Value) {
        self.lock().insert(id.into(), document);
    }

    pub fn document(&self, id: &str) -> Option<Value> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted ids of every stored document.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&mut self, id: &str) -> StoreResult<Option<Value>> {
        self.ensure_open()?;
        Ok(self.document(id))
    }

    async fn bulk_upsert(&mut self, documents: &[(&str, &Value)]) -> StoreResult<BulkOutcome> {
        self.ensure_open()?;
        let mut map = self.lock();
        let mut outcome = BulkOutcome::default();
        for (id, document) in documents {
            map.insert(id.to_string(), (*document).clone());
            outcome.succeeded.push(id.to_string());
        }
        debug!(count = documents.len(), "Memory bulk upsert");
        Ok(outcome)
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self) -> StoreResult<Box<dyn DocumentStore>> {
        let mut connection = self.clone();
        connection.closed = false;
        Ok(Box::new(connection))
    }
}
