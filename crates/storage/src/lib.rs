//! Storage abstractions for the ingest workers.
//!
//! Provides:
//! - The document store interface with Redis and in-memory backends
//! - The persistence gateway (chunked bulk writes with one retry, or
//!   local JSON files)
//! - The shared work queue

pub mod memory;
pub mod persist;
pub mod queue;
pub mod redis_store;
pub mod store;

pub use memory::MemoryStore;
pub use persist::{persist_to_file, PersistConfig, PersistReport, PersistenceGateway};
pub use queue::WorkQueue;
pub use redis_store::{RedisConnector, RedisStore};
pub use store::{BulkOutcome, DocumentStore, StoreConnector, StoreError, StoreResult};
