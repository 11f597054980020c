//! Ingest manager: fills the queue, runs the workers, aggregates results.

use std::sync::Arc;

use document_builder::BuilderRegistry;
use futures::future::join_all;
use ingest_common::WorkItem;
use serde::Serialize;
use storage::{PersistReport, StoreConnector, WorkQueue};
use tracing::{error, info, instrument, warn};

use crate::error::IngestionError;
use crate::worker::{Worker, WorkerConfig, WorkerSummary};

/// Aggregate outcome of one ingest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub items_enqueued: usize,
    pub items_completed: usize,
    pub items_processed: usize,
    pub items_failed: usize,
    /// Items no worker got to, because every worker died.
    pub items_unprocessed: usize,
    pub documents_built: usize,
    pub files_written: usize,
    pub persist: PersistReport,
    pub workers_started: usize,
    pub workers_failed: usize,
    pub workers: Vec<WorkerSummary>,
}

impl IngestReport {
    /// True when every item was processed and nothing was abandoned.
    pub fn is_success(&self) -> bool {
        self.items_failed == 0
            && self.items_unprocessed == 0
            && self.workers_failed == 0
            && self.persist.abandoned == 0
    }

    fn add_worker(&mut self, summary: WorkerSummary) {
        self.items_processed += summary.items_processed;
        self.items_failed += summary.items_failed;
        self.documents_built += summary.documents_built;
        self.files_written += summary.files_written;
        self.persist.merge(&summary.persist);
        self.workers.push(summary);
    }
}

/// Coordinates one ingest run over a fixed list of work items.
pub struct IngestManager {
    connector: Arc<dyn StoreConnector>,
    registry: Arc<BuilderRegistry>,
    config: Arc<WorkerConfig>,
    worker_count: usize,
}

impl IngestManager {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        registry: Arc<BuilderRegistry>,
        config: WorkerConfig,
        worker_count: usize,
    ) -> Self {
        Self {
            connector,
            registry,
            config: Arc::new(config),
            worker_count: worker_count.max(1),
        }
    }

    /// Enqueue `items`, run the workers and wait for them.
    ///
    /// Returns once every item has been completed and the workers have
    /// drained, or once every worker has exited, whichever comes first.
    #[instrument(skip(self, items), fields(items = items.len(), workers = self.worker_count))]
    pub async fn run(&self, items: Vec<WorkItem>) -> IngestReport {
        let queue = WorkQueue::new();
        let mut report = IngestReport {
            items_enqueued: items.len(),
            workers_started: self.worker_count,
            ..Default::default()
        };
        for item in items {
            queue.put(item);
        }

        let handles: Vec<_> = (0..self.worker_count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    queue.clone(),
                    self.connector.clone(),
                    self.registry.clone(),
                    self.config.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();
        info!("Started workers");

        let workers = join_all(handles);
        tokio::pin!(workers);
        let early = tokio::select! {
            _ = queue.join() => None,
            results = &mut workers => Some(results),
        };
        let results = match early {
            Some(results) => results,
            None => {
                info!("All work items complete, waiting for workers to drain");
                workers.await
            }
        };

        for result in results {
            match result {
                Ok(Ok(summary)) => report.add_worker(summary),
                Ok(Err(e)) => {
                    report.workers_failed += 1;
                    error!(error = %e, "Worker failed");
                }
                Err(e) => {
                    report.workers_failed += 1;
                    let e = IngestionError::Worker(e.to_string());
                    error!(error = %e, "Worker task aborted");
                }
            }
        }

        report.items_completed = queue.completed();
        report.items_unprocessed = queue.outstanding();
        if report.items_unprocessed > 0 {
            warn!(
                unprocessed = report.items_unprocessed,
                "Workers exited before the queue was complete"
            );
        }

        info!(
            processed = report.items_processed,
            failed = report.items_failed,
            unprocessed = report.items_unprocessed,
            documents = report.documents_built,
            written = report.persist.written,
            abandoned = report.persist.abandoned,
            "Ingest run finished"
        );
        report
    }
}
