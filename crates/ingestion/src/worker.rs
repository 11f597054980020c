//! Ingest worker.
//!
//! A worker connects once, then alternates between taking items from the
//! shared queue and processing them. An empty queue is polled a bounded
//! number of times, with a pause between polls, before the worker
//! disconnects. A failed item is logged and completed like any other; it
//! never counts towards the drain bound.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use document_builder::{BuilderCache, BuilderRegistry};
use ingest_common::{IngestDescriptor, WorkItem};
use serde::Serialize;
use storage::{
    persist_to_file, DocumentStore, PersistConfig, PersistReport, PersistenceGateway,
    StoreConnector, WorkQueue,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::metrics;

/// Default number of empty polls before a worker disconnects.
pub const DEFAULT_DRAIN_MAX_POLLS: u32 = 3;

/// Default pause after each empty poll.
pub const DEFAULT_DRAIN_PAUSE: Duration = Duration::from_secs(1);

/// Where built documents go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Chunked bulk upserts to the document store.
    Store,
    /// One JSON array file per work item in this directory.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub drain_max_polls: u32,
    pub drain_pause: Duration,
    pub output: OutputMode,
    /// Descriptor used for source-file items. Fetched once per worker.
    pub job_descriptor: Option<String>,
    pub persist: PersistConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            drain_max_polls: DEFAULT_DRAIN_MAX_POLLS,
            drain_pause: DEFAULT_DRAIN_PAUSE,
            output: OutputMode::Store,
            job_descriptor: None,
            persist: PersistConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    Ready,
    Processing,
    Draining,
    Disconnected,
}

/// What one worker did over its lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerSummary {
    pub worker: usize,
    pub items_processed: usize,
    pub items_failed: usize,
    pub documents_built: usize,
    pub files_written: usize,
    pub persist: PersistReport,
    /// Empty polls that ended in a pause.
    pub drain_polls: u32,
}

/// One ingest worker. Owns its store connection and builder cache.
pub struct Worker {
    id: usize,
    queue: WorkQueue,
    connector: Arc<dyn StoreConnector>,
    registry: Arc<BuilderRegistry>,
    config: Arc<WorkerConfig>,
    gateway: PersistenceGateway,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: WorkQueue,
        connector: Arc<dyn StoreConnector>,
        registry: Arc<BuilderRegistry>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        let gateway = PersistenceGateway::new(config.persist.clone());
        Self {
            id,
            queue,
            connector,
            registry,
            config,
            gateway,
        }
    }

    /// Run until the queue has drained. Fails only if the worker cannot
    /// connect or fetch its job descriptor.
    #[instrument(skip(self), fields(worker = self.id))]
    pub async fn run(self) -> Result<WorkerSummary> {
        let mut summary = WorkerSummary {
            worker: self.id,
            ..Default::default()
        };
        let mut cache = BuilderCache::new(self.registry.clone());
        let mut store: Option<Box<dyn DocumentStore>> = None;
        let mut job: Option<IngestDescriptor> = None;
        let mut current: Option<WorkItem> = None;
        let mut drain_count = 0u32;
        let mut state = WorkerState::Connecting;

        loop {
            debug!(state = ?state, "Worker state");
            state = match state {
                WorkerState::Connecting => {
                    let (conn, descriptor) = self.connect().await?;
                    store = Some(conn);
                    job = descriptor;
                    info!("Worker connected");
                    WorkerState::Ready
                }
                WorkerState::Ready => match self.queue.try_get() {
                    Some(item) => {
                        current = Some(item);
                        WorkerState::Processing
                    }
                    None => WorkerState::Draining,
                },
                WorkerState::Processing => {
                    if let (Some(item), Some(conn)) = (current.take(), store.as_mut()) {
                        self.process(conn.as_mut(), &mut cache, job.as_ref(), &item, &mut summary)
                            .await;
                        self.queue.mark_complete();
                    }
                    drain_count = 0;
                    WorkerState::Ready
                }
                WorkerState::Draining => {
                    if drain_count >= self.config.drain_max_polls {
                        WorkerState::Disconnected
                    } else {
                        drain_count += 1;
                        summary.drain_polls += 1;
                        debug!(poll = drain_count, "Queue empty, pausing");
                        tokio::time::sleep(self.config.drain_pause).await;
                        WorkerState::Ready
                    }
                }
                WorkerState::Disconnected => {
                    if let Some(mut conn) = store.take() {
                        if let Err(e) = conn.close().await {
                            warn!(error = %e, "Failed to close store connection");
                        }
                    }
                    break;
                }
            };
        }

        info!(
            processed = summary.items_processed,
            failed = summary.items_failed,
            documents = summary.documents_built,
            builders = cache.len(),
            "Worker disconnected"
        );
        Ok(summary)
    }

    /// Open the store connection and fetch the job descriptor, if any.
    async fn connect(&self) -> Result<(Box<dyn DocumentStore>, Option<IngestDescriptor>)> {
        let mut conn = self
            .connector
            .connect()
            .await
            .map_err(IngestionError::Connect)?;

        let Some(id) = &self.config.job_descriptor else {
            return Ok((conn, None));
        };
        match fetch_descriptor(conn.as_mut(), id).await {
            Ok(descriptor) => Ok((conn, Some(descriptor))),
            Err(e) => {
                let _ = conn.close().await;
                Err(e)
            }
        }
    }

    /// Build and persist one item, logging rather than returning failures.
    #[instrument(skip_all, fields(item = %item))]
    async fn process(
        &self,
        store: &mut dyn DocumentStore,
        cache: &mut BuilderCache,
        job: Option<&IngestDescriptor>,
        item: &WorkItem,
        summary: &mut WorkerSummary,
    ) {
        match self.process_item(store, cache, job, item, summary).await {
            Ok(documents) => {
                summary.items_processed += 1;
                metrics::record_item_processed();
                info!(documents, "Work item complete");
            }
            Err(e) => {
                summary.items_failed += 1;
                metrics::record_item_failed();
                error!(error = %e, "Work item failed");
            }
        }
    }

    async fn process_item(
        &self,
        store: &mut dyn DocumentStore,
        cache: &mut BuilderCache,
        job: Option<&IngestDescriptor>,
        item: &WorkItem,
        summary: &mut WorkerSummary,
    ) -> Result<usize> {
        let descriptor = match item {
            WorkItem::Descriptor(id) => fetch_descriptor(store, id).await?,
            WorkItem::Source(_) => job
                .cloned()
                .ok_or_else(|| IngestionError::NoDescriptor(item.to_string()))?,
        };

        let documents = cache.get(&descriptor)?.build(&descriptor, item)?;
        summary.documents_built += documents.len();
        metrics::record_documents_built(documents.len());

        match &self.config.output {
            OutputMode::Store => {
                let report = self.gateway.persist(store, &documents).await;
                metrics::record_persist(&report);
                summary.persist.merge(&report);
            }
            OutputMode::File(dir) => {
                persist_to_file(dir, item, &documents).await?;
                summary.files_written += 1;
            }
        }

        Ok(documents.len())
    }
}

/// Fetch and parse the descriptor stored under `id`.
pub async fn fetch_descriptor(store: &mut dyn DocumentStore, id: &str) -> Result<IngestDescriptor> {
    let value = store
        .get(id)
        .await?
        .ok_or_else(|| IngestionError::DescriptorNotFound(id.to_string()))?;
    Ok(IngestDescriptor::from_value(id, value)?)
}
