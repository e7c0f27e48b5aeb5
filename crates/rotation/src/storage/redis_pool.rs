//! Managed pool of multiplexed Redis connections.

use std::sync::atomic::{AtomicUsize, Ordering};

use deadpool::managed::{self, Metrics};
use redis::{Client, RedisError, RedisResult, aio::MultiplexedConnection};

use config::RedisConfig;

pub(crate) type Pool = managed::Pool<Manager>;

#[derive(Debug)]
pub(crate) struct Manager {
    client: Client,
    pings: AtomicUsize,
}

impl managed::Manager for Manager {
    type Type = MultiplexedConnection;
    type Error = RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut MultiplexedConnection, _: &Metrics) -> managed::RecycleResult<RedisError> {
        let token = self.pings.fetch_add(1, Ordering::Relaxed).to_string();

        let echoed: String = redis::cmd("PING").arg(&token).query_async(conn).await?;

        if echoed == token {
            Ok(())
        } else {
            Err(managed::RecycleError::message("Unexpected PING reply"))
        }
    }
}

pub(crate) fn create_pool(config: &RedisConfig) -> RedisResult<Pool> {
    let manager = Manager {
        client: Client::open(config.url.as_str())?,
        pings: AtomicUsize::new(0),
    };

    let mut pool_config = managed::PoolConfig::default();

    if let Some(max_size) = config.pool.max_size {
        pool_config.max_size = max_size;
    }

    pool_config.timeouts.create = config.pool.timeout_create;
    pool_config.timeouts.wait = config.pool.timeout_wait;
    pool_config.timeouts.recycle = config.pool.timeout_recycle;

    Pool::builder(manager)
        .config(pool_config)
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| RedisError::from((redis::ErrorKind::IoError, "Failed to create pool", e.to_string())))
}
