//! Process-local rotation state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{RotationStorage, StorageError};

const UNSET: usize = usize::MAX;

/// In-memory storage of the active index. Clones share the same record.
#[derive(Debug, Clone)]
pub struct InMemoryStorage {
    active_index: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            active_index: Arc::new(AtomicUsize::new(UNSET)),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationStorage for InMemoryStorage {
    async fn load(&self) -> Result<Option<usize>, StorageError> {
        let index = self.active_index.load(Ordering::Acquire);
        Ok((index != UNSET).then_some(index))
    }

    async fn store(&self, index: usize) -> Result<(), StorageError> {
        self.active_index.store(index, Ordering::Release);
        Ok(())
    }
}
