//! Rotation state shared between instances through a single Redis key.

use std::future::Future;
use std::time::Duration;

use config::RedisConfig;

use super::redis_pool::{Pool, create_pool};
use super::{RotationStorage, StorageError};

/// Redis-backed storage of the active index.
#[derive(Clone)]
pub struct RedisStorage {
    pool: Pool,
    key: String,
    response_timeout: Duration,
}

impl RedisStorage {
    /// Connect to Redis and verify the server answers.
    pub async fn new(config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        let storage = Self {
            pool,
            key: active_index_key(&config.key_prefix),
            response_timeout: config.response_timeout,
        };

        let mut conn = storage.connection().await?;

        let _: String = storage
            .with_timeout(redis::cmd("PING").query_async(&mut *conn))
            .await?
            .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

        log::debug!("Rotation state stored in Redis under '{}'", storage.key);

        Ok(storage)
    }

    async fn connection(&self) -> Result<deadpool::managed::Object<super::redis_pool::Manager>, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))
    }

    async fn with_timeout<F: Future>(&self, future: F) -> Result<F::Output, StorageError> {
        tokio::time::timeout(self.response_timeout, future)
            .await
            .map_err(|_| StorageError::Timeout)
    }
}

impl RotationStorage for RedisStorage {
    async fn load(&self) -> Result<Option<usize>, StorageError> {
        let mut conn = self.connection().await?;

        self.with_timeout(redis::cmd("GET").arg(&self.key).query_async(&mut *conn))
            .await?
            .map_err(|e: redis::RedisError| StorageError::Query(e.to_string()))
    }

    async fn store(&self, index: usize) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;

        self.with_timeout(redis::cmd("SET").arg(&self.key).arg(index).query_async(&mut *conn))
            .await?
            .map_err(|e: redis::RedisError| StorageError::Query(e.to_string()))
    }
}

fn active_index_key(prefix: &str) -> String {
    format!("{prefix}active_index")
}

#[cfg(test)]
mod tests {
    #[test]
    fn key_uses_configured_prefix() {
        assert_eq!(super::active_index_key("tally:rotation:"), "tally:rotation:active_index");
        assert_eq!(super::active_index_key(""), "active_index");
    }
}
