//! Persistence gateway.
//!
//! Store mode writes a document map in fixed-size chunks. A chunk whose
//! bulk write times out gets exactly one retry holding only the keys the
//! store reported as failed; whatever fails again is abandoned and logged.
//! File mode writes one JSON array per work item to a local directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ingest_common::{DocumentMap, WorkItem};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::store::{BulkOutcome, DocumentStore, StoreError, StoreResult};

/// Default number of documents per bulk write.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default pause before retrying the failed part of a chunk.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct PersistConfig {
    pub chunk_size: usize,
    pub retry_pause: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }
}

/// What one or more `persist` calls did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Chunks the document maps were split into.
    pub chunks: usize,
    /// Bulk write calls issued, retries included.
    pub write_calls: usize,
    /// Documents confirmed written.
    pub written: usize,
    /// Documents sent again after a timeout.
    pub retried: usize,
    /// Documents given up on.
    pub abandoned: usize,
}

impl PersistReport {
    pub fn merge(&mut self, other: &PersistReport) {
        self.chunks += other.chunks;
        self.write_calls += other.write_calls;
        self.written += other.written;
        self.retried += other.retried;
        self.abandoned += other.abandoned;
    }
}

/// Writes document maps to a store.
#[derive(Debug, Clone, Default)]
pub struct PersistenceGateway {
    config: PersistConfig,
}

impl PersistenceGateway {
    pub fn new(config: PersistConfig) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            config: PersistConfig {
                chunk_size,
                ..config
            },
        }
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Write `documents` chunk by chunk. Never fails: losses are logged and
    /// counted in the report.
    #[instrument(skip(self, store, documents), fields(documents = documents.len()))]
    pub async fn persist(&self, store: &mut dyn DocumentStore, documents: &DocumentMap) -> PersistReport {
        let mut report = PersistReport::default();
        if documents.is_empty() {
            info!("No documents to persist");
            return report;
        }

        let entries: Vec<(&str, &Value)> = documents
            .iter()
            .map(|(id, document)| (id.as_str(), document))
            .collect();

        for (index, chunk) in entries.chunks(self.config.chunk_size).enumerate() {
            report.chunks += 1;
            self.write_chunk(store, index, chunk, &mut report).await;
        }

        info!(
            chunks = report.chunks,
            written = report.written,
            retried = report.retried,
            abandoned = report.abandoned,
            "Persisted documents"
        );
        report
    }

    async fn write_chunk(
        &self,
        store: &mut dyn DocumentStore,
        index: usize,
        chunk: &[(&str, &Value)],
        report: &mut PersistReport,
    ) {
        report.write_calls += 1;
        let outcome = match store.bulk_upsert(chunk).await {
            Ok(outcome) => {
                report.written += outcome.succeeded.len();
                return;
            }
            Err(StoreError::Timeout { outcome }) => outcome,
            Err(StoreError::Partial { outcome, message }) => {
                report.written += outcome.succeeded.len();
                report.abandoned += outcome.failed.len();
                error!(
                    chunk = index,
                    abandoned = outcome.failed.len(),
                    ids = ?abandoned_sample(&outcome),
                    error = %message,
                    "Bulk write rejected documents, abandoned"
                );
                return;
            }
            Err(e) => {
                error!(chunk = index, size = chunk.len(), error = %e, "Bulk write failed, chunk abandoned");
                report.abandoned += chunk.len();
                return;
            }
        };

        report.written += outcome.succeeded.len();
        let retry: Vec<(&str, &Value)> = chunk
            .iter()
            .filter(|(id, _)| outcome.failed.iter().any(|failed| failed == id))
            .copied()
            .collect();
        if retry.is_empty() {
            return;
        }

        warn!(
            chunk = index,
            failed = retry.len(),
            pause_ms = self.config.retry_pause.as_millis() as u64,
            "Bulk write timed out, retrying failed documents"
        );
        tokio::time::sleep(self.config.retry_pause).await;

        report.write_calls += 1;
        report.retried += retry.len();
        match store.bulk_upsert(&retry).await {
            Ok(outcome) => report.written += outcome.succeeded.len(),
            Err(StoreError::Timeout { outcome }) => {
                report.written += outcome.succeeded.len();
                report.abandoned += outcome.failed.len();
                error!(
                    chunk = index,
                    abandoned = outcome.failed.len(),
                    ids = ?abandoned_sample(&outcome),
                    "Retry timed out, documents abandoned"
                );
            }
            Err(StoreError::Partial { outcome, message }) => {
                report.written += outcome.succeeded.len();
                report.abandoned += outcome.failed.len();
                error!(
                    chunk = index,
                    abandoned = outcome.failed.len(),
                    ids = ?abandoned_sample(&outcome),
                    error = %message,
                    "Retry rejected documents, abandoned"
                );
            }
            Err(e) => {
                report.abandoned += retry.len();
                error!(chunk = index, abandoned = retry.len(), error = %e, "Retry failed, documents abandoned");
            }
        }
    }
}

/// First few abandoned ids, for the log line.
fn abandoned_sample(outcome: &BulkOutcome) -> &[String] {
    &outcome.failed[..outcome.failed.len().min(10)]
}

/// Write `documents` as one JSON array to `output_dir`, named after `item`.
#[instrument(skip(item, documents), fields(item = %item, documents = documents.len()))]
pub async fn persist_to_file(
    output_dir: &Path,
    item: &WorkItem,
    documents: &DocumentMap,
) -> StoreResult<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| StoreError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

    let path = output_dir.join(item.output_file_name());
    let values: Vec<&Value> = documents.values().collect();
    let body = serde_json::to_vec_pretty(&values)
        .map_err(|e| StoreError::Operation(format!("Serialization failed: {}", e)))?;

    tokio::fs::write(&path, body)
        .await
        .map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

    debug!(path = %path.display(), "Wrote documents to file");
    Ok(path)
}
