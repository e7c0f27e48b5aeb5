//! Provider credential rotation for Tally.
//!
//! A [`CredentialPool`] holds the interchangeable API keys of the provider
//! and the process-wide index of the active one. Requests walk the pool
//! through a [`RotationSession`], which allows at most one full cycle around
//! the pool per request. The active index is persisted through a storage
//! backend, either in memory or in Redis when several instances share the
//! same keys.

#![deny(missing_docs)]

mod error;
mod pool;
mod storage;

pub use error::{Exhausted, RotationError};
pub use pool::{Credential, CredentialPool, RotationSession};
pub use storage::{InMemoryStorage, RotationStorage, StorageError};
