//! Keyed store holding per-photo fields (Redis hashes keyed by `photo_id`)

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read one field, `None` when the key or field is absent
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Write one field
    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Redis hash store
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.hget(key, field)
            .await
            .map_err(|e| WorkerError::Persist(e.to_string()))
    }

    async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .hset(key, field, value)
            .await
            .map_err(|e| WorkerError::Persist(e.to_string()))?;

        debug!(key = %key, field = %field, "Stored field");
        Ok(())
    }
}
