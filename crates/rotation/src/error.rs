//! Error types for credential rotation.

use crate::storage::StorageError;

/// Errors that can occur while building a credential pool.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    /// The pool was configured without any credential.
    #[error("At least one provider credential is required")]
    NoCredentials,

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Every credential of the pool was tried within the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("All {tried} provider credentials are exhausted")]
pub struct Exhausted {
    /// Number of credentials tried before giving up.
    pub tried: usize,
}
