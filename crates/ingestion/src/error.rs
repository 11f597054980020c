//! Error types for the ingestion crate.

use document_builder::BuildError;
use ingest_common::CommonError;
use storage::StoreError;
use thiserror::Error;

/// Errors that can occur while running ingest workers.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Worker failed to connect to the store: {0}")]
    Connect(#[source] StoreError),

    #[error("Ingest descriptor not found: {0}")]
    DescriptorNotFound(String),

    #[error("No ingest descriptor for work item {0}")]
    NoDescriptor(String),

    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] CommonError),

    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
