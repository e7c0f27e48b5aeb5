use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use config::StorageConfig;
use secrecy::SecretString;

use crate::error::{Exhausted, RotationError};
use crate::storage::{InMemoryStorage, Storage, redis::RedisStorage};

/// One provider API key and its position in the pool.
///
/// Credentials are identified in logs by their index only.
#[derive(Debug, Clone)]
pub struct Credential {
    index: usize,
    secret: SecretString,
}

impl Credential {
    /// Position of the credential in the configured list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The API key.
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

/// Ordered set of interchangeable credentials with a shared active index.
pub struct CredentialPool {
    credentials: Arc<[Credential]>,
    /// Last index observed or written by this process. Used when the store
    /// has no record or cannot be reached.
    last_known: AtomicUsize,
    storage: Storage,
}

impl CredentialPool {
    /// Create a pool persisting its active index in the configured backend.
    pub async fn new(keys: Vec<SecretString>, storage: &StorageConfig) -> Result<Self, RotationError> {
        let storage = match storage {
            StorageConfig::Memory => Storage::Memory(InMemoryStorage::new()),
            StorageConfig::Redis(config) => Storage::Redis(RedisStorage::new(config).await?),
        };

        Self::with_storage(keys, storage)
    }

    /// Create a pool whose rotation state lives only in this process.
    pub fn in_memory(keys: Vec<SecretString>) -> Result<Self, RotationError> {
        Self::with_storage(keys, Storage::Memory(InMemoryStorage::new()))
    }

    pub(crate) fn with_storage(keys: Vec<SecretString>, storage: Storage) -> Result<Self, RotationError> {
        if keys.is_empty() {
            return Err(RotationError::NoCredentials);
        }

        let credentials = keys
            .into_iter()
            .enumerate()
            .map(|(index, secret)| Credential { index, secret })
            .collect();

        Ok(Self {
            credentials,
            last_known: AtomicUsize::new(0),
            storage,
        })
    }

    /// Number of credentials in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// A pool is never empty once constructed.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Reads the active index from storage and starts a rotation cycle at it.
    pub async fn rotation(&self) -> RotationSession<'_> {
        let start = self.active_index().await;

        RotationSession {
            pool: self,
            start,
            current: start,
        }
    }

    async fn active_index(&self) -> usize {
        match self.storage.load().await {
            Ok(Some(index)) if index < self.len() => {
                self.last_known.store(index, Ordering::Relaxed);
                index
            }
            Ok(Some(index)) => {
                log::warn!(
                    "Persisted credential index {index} is outside a pool of {} credentials, ignoring it",
                    self.len()
                );

                self.last_known.load(Ordering::Relaxed)
            }
            Ok(None) => self.last_known.load(Ordering::Relaxed),
            Err(error) => {
                log::warn!("Failed to read the active credential index: {error}");
                self.last_known.load(Ordering::Relaxed)
            }
        }
    }

    async fn persist(&self, index: usize) {
        self.last_known.store(index, Ordering::Relaxed);

        if let Err(error) = self.storage.store(index).await {
            log::warn!("Failed to persist active credential index {index}: {error}");
        }
    }
}

/// One request's walk around the pool.
///
/// The walk ends when advancing would return to the credential it started on.
pub struct RotationSession<'a> {
    pool: &'a CredentialPool,
    start: usize,
    current: usize,
}

impl RotationSession<'_> {
    /// The credential currently in use by this request.
    pub fn current(&self) -> Credential {
        self.pool.credentials[self.current].clone()
    }

    /// Moves to the next credential and persists it as the active one.
    ///
    /// Returns [`Exhausted`] without touching the stored index once every
    /// credential has been tried by this session.
    pub async fn advance(&mut self) -> Result<Credential, Exhausted> {
        let next = (self.current + 1) % self.pool.len();

        if next == self.start {
            log::warn!("All {} provider credentials are exhausted for this request", self.pool.len());
            return Err(Exhausted { tried: self.pool.len() });
        }

        log::info!("Rotating provider credential from #{} to #{next}", self.current);

        self.pool.persist(next).await;
        self.current = next;

        Ok(self.current())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};

    use super::*;
    use crate::storage::RotationStorage;

    fn keys(n: usize) -> Vec<SecretString> {
        (0..n).map(|i| SecretString::from(format!("key-{i}"))).collect()
    }

    #[tokio::test]
    async fn starts_at_first_credential() {
        let pool = CredentialPool::in_memory(keys(2)).unwrap();
        let rotation = pool.rotation().await;

        assert_eq!(rotation.current().index(), 0);
        assert_eq!(rotation.current().secret().expose_secret(), "key-0");
    }

    #[tokio::test]
    async fn empty_pool_is_rejected() {
        let result = CredentialPool::in_memory(Vec::new());
        assert!(matches!(result, Err(RotationError::NoCredentials)));
    }

    #[tokio::test]
    async fn full_cycle_ends_in_exhaustion() {
        let pool = CredentialPool::in_memory(keys(3)).unwrap();
        let mut rotation = pool.rotation().await;

        assert_eq!(rotation.advance().await.unwrap().index(), 1);
        assert_eq!(rotation.advance().await.unwrap().index(), 2);
        assert_eq!(rotation.advance().await.unwrap_err(), Exhausted { tried: 3 });
    }

    #[tokio::test]
    async fn single_credential_is_exhausted_immediately() {
        let pool = CredentialPool::in_memory(keys(1)).unwrap();
        let mut rotation = pool.rotation().await;

        assert!(rotation.advance().await.is_err());
        assert_eq!(rotation.current().index(), 0);
    }

    #[tokio::test]
    async fn cycle_wraps_from_persisted_index() {
        let storage = InMemoryStorage::new();
        storage.store(2).await.unwrap();

        let pool = CredentialPool::with_storage(keys(3), Storage::Memory(storage)).unwrap();
        let mut rotation = pool.rotation().await;

        assert_eq!(rotation.current().index(), 2);
        assert_eq!(rotation.advance().await.unwrap().index(), 0);
        assert_eq!(rotation.advance().await.unwrap().index(), 1);
        assert!(rotation.advance().await.is_err());
    }

    #[tokio::test]
    async fn exhaustion_leaves_stored_index_untouched() {
        let storage = InMemoryStorage::new();
        let pool = CredentialPool::with_storage(keys(2), Storage::Memory(storage.clone())).unwrap();
        let mut rotation = pool.rotation().await;

        rotation.advance().await.unwrap();
        assert_eq!(storage.load().await.unwrap(), Some(1));

        assert!(rotation.advance().await.is_err());
        assert_eq!(storage.load().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn other_pools_observe_the_rotation() {
        let storage = InMemoryStorage::new();
        let first = CredentialPool::with_storage(keys(2), Storage::Memory(storage.clone())).unwrap();
        let second = CredentialPool::with_storage(keys(2), Storage::Memory(storage)).unwrap();

        first.rotation().await.advance().await.unwrap();

        assert_eq!(second.rotation().await.current().index(), 1);
    }

    #[tokio::test]
    async fn out_of_range_index_is_ignored() {
        let storage = InMemoryStorage::new();
        storage.store(7).await.unwrap();

        let pool = CredentialPool::with_storage(keys(2), Storage::Memory(storage)).unwrap();

        assert_eq!(pool.rotation().await.current().index(), 0);
    }
}
