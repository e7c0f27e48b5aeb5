//! Storage backends for the active credential index.

pub mod memory;
pub mod redis;
mod redis_pool;

pub use memory::InMemoryStorage;

/// Narrow persistence interface for the rotation state.
///
/// Writers may race; the pool only needs readers to eventually observe one
/// of the written values.
#[allow(async_fn_in_trait)]
pub trait RotationStorage: Send + Sync {
    /// Reads the persisted active index, if one was ever written.
    async fn load(&self) -> Result<Option<usize>, StorageError>;

    /// Persists a new active index.
    async fn store(&self, index: usize) -> Result<(), StorageError>;
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("Query error: {0}")]
    Query(String),

    /// The backend did not answer in time.
    #[error("Storage did not respond within the configured timeout")]
    Timeout,
}

/// Storage backend selected from configuration.
#[derive(Clone)]
pub(crate) enum Storage {
    Memory(InMemoryStorage),
    Redis(redis::RedisStorage),
}

impl Storage {
    pub(crate) async fn load(&self) -> Result<Option<usize>, StorageError> {
        match self {
            Storage::Memory(storage) => storage.load().await,
            Storage::Redis(storage) => storage.load().await,
        }
    }

    pub(crate) async fn store(&self, index: usize) -> Result<(), StorageError> {
        match self {
            Storage::Memory(storage) => storage.store(index).await,
            Storage::Redis(storage) => storage.store(index).await,
        }
    }
}
