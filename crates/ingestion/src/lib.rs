//! Ingest workers and their coordinator.
//!
//! The manager fills a shared [`storage::WorkQueue`] and starts N workers.
//! Each worker owns its store connection and builder cache and runs the
//! state machine
//!
//! ```text
//! Connecting -> Ready <-> Processing
//!                 |
//!                 v
//!              Draining -> Ready | Disconnected
//! ```
//!
//! until the queue has stayed empty for a bounded number of polls.

pub mod error;
pub mod manager;
mod metrics;
pub mod worker;

// Re-exports
pub use error::{IngestionError, Result};
pub use manager::{IngestManager, IngestReport};
pub use worker::{OutputMode, Worker, WorkerConfig, WorkerState, WorkerSummary};
