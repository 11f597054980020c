//! Document store interface.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// Some writes in a bulk call did not complete in time. `outcome`
    /// says which keys made it.
    #[error("Bulk write timed out: {} of {} documents not written", .outcome.failed.len(), .outcome.total())]
    Timeout { outcome: BulkOutcome },

    /// Some writes in a bulk call were rejected by the store.
    #[error("Bulk write failed: {} of {} documents not written: {message}", .outcome.failed.len(), .outcome.total())]
    Partial { outcome: BulkOutcome, message: String },

    #[error("Store operation failed: {0}")]
    Operation(String),

    #[error("Invalid stored document '{id}': {message}")]
    InvalidDocument { id: String, message: String },

    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store connection is closed")]
    Closed,
}

/// Per-key result of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BulkOutcome {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// One worker's connection to the document store.
///
/// Connections are owned by a single worker and never shared.
#[async_trait]
pub trait DocumentStore: Send {
    /// Fetch the document stored under `id`.
    async fn get(&mut self, id: &str) -> StoreResult<Option<Value>>;

    /// Upsert every `(id, document)` pair.
    ///
    /// Returns [`StoreError::Timeout`] carrying the partial outcome when
    /// some writes did not finish in time, and [`StoreError::Partial`]
    /// when some were rejected outright.
    async fn bulk_upsert(&mut self, documents: &[(&str, &Value)]) -> StoreResult<BulkOutcome>;

    /// Release the connection. Later calls fail with [`StoreError::Closed`].
    async fn close(&mut self) -> StoreResult<()>;
}

/// Opens store connections, one per worker.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> StoreResult<Box<dyn DocumentStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_counts() {
        let err = StoreError::Timeout {
            outcome: BulkOutcome {
                succeeded: vec!["a".to_string()],
                failed: vec!["b".to_string(), "c".to_string()],
            },
        };
        assert_eq!(err.to_string(), "Bulk write timed out: 2 of 3 documents not written");
    }

    #[test]
    fn test_partial_message_counts() {
        let err = StoreError::Partial {
            outcome: BulkOutcome {
                succeeded: vec!["a".to_string(), "b".to_string()],
                failed: vec!["c".to_string()],
            },
            message: "c: OOM".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Bulk write failed: 1 of 3 documents not written: c: OOM"
        );
    }
}
