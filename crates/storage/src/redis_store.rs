//! Redis document store.
//!
//! Documents are stored as JSON strings under `key_prefix + id`.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::{BulkOutcome, DocumentStore, StoreConnector, StoreError, StoreResult};

/// Opens one multiplexed Redis connection per worker.
pub struct RedisConnector {
    client: Client,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisConnector {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>, op_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Connection(format!("Invalid Redis URL: {}", e)))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            op_timeout,
        })
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self) -> StoreResult<Box<dyn DocumentStore>> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(format!("Redis connection failed: {}", e)))?;

        info!(prefix = %self.key_prefix, "Connected to Redis");
        Ok(Box::new(RedisStore {
            conn: Some(conn),
            key_prefix: self.key_prefix.clone(),
            op_timeout: self.op_timeout,
        }))
    }
}

/// One worker's Redis connection.
pub struct RedisStore {
    conn: Option<MultiplexedConnection>,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisStore {
    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    fn conn(&self) -> StoreResult<MultiplexedConnection> {
        self.conn.clone().ok_or(StoreError::Closed)
    }
}

enum WriteResult {
    Written,
    TimedOut,
    Failed(String),
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn get(&mut self, id: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.conn()?;
        let key = self.key(id);

        let raw: Option<String> = tokio::time::timeout(self.op_timeout, conn.get::<_, Option<String>>(&key))
            .await
            .map_err(|_| StoreError::Operation(format!("Get {} timed out", key)))?
            .map_err(|e| StoreError::Operation(format!("Get {} failed: {}", key, e)))?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| StoreError::InvalidDocument {
                id: id.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
    }

    async fn bulk_upsert(&mut self, documents: &[(&str, &Value)]) -> StoreResult<BulkOutcome> {
        let conn = self.conn()?;
        let op_timeout = self.op_timeout;

        let writes = documents.iter().map(|(id, document)| {
            let mut conn = conn.clone();
            let key = self.key(id);
            let body = document.to_string();
            async move {
                match tokio::time::timeout(op_timeout, conn.set::<_, _, ()>(&key, body)).await {
                    Ok(Ok(())) => WriteResult::Written,
                    Ok(Err(e)) => WriteResult::Failed(format!("{}: {}", key, e)),
                    Err(_) => WriteResult::TimedOut,
                }
            }
        });
        let results = join_all(writes).await;

        let mut outcome = BulkOutcome::default();
        let mut timed_out = false;
        let mut errors = Vec::new();
        for ((id, _), result) in documents.iter().zip(results) {
            match result {
                WriteResult::Written => outcome.succeeded.push(id.to_string()),
                WriteResult::TimedOut => {
                    timed_out = true;
                    outcome.failed.push(id.to_string());
                }
                WriteResult::Failed(message) => {
                    errors.push(message);
                    outcome.failed.push(id.to_string());
                }
            }
        }

        debug!(
            written = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Redis bulk upsert"
        );

        if timed_out {
            return Err(StoreError::Timeout { outcome });
        }
        if !errors.is_empty() {
            warn!(errors = errors.len(), written = outcome.succeeded.len(), "Redis writes failed");
            return Err(StoreError::Partial {
                outcome,
                message: errors.join("; "),
            });
        }
        Ok(outcome)
    }

    async fn close(&mut self) -> StoreResult<()> {
        if self.conn.take().is_some() {
            debug!(prefix = %self.key_prefix, "Closed Redis connection");
        }
        Ok(())
    }
}
