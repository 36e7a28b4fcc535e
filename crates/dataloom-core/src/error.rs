//! Core error types.

use thiserror::Error;

use dataloom_provider::ProviderError;

/// Errors raised by the shared cache layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A rollback found the entry rewritten by a later mutation.
    #[error(
        "rollback conflict on {resource}/{id}: expected version {expected}, found {found:?}"
    )]
    RollbackConflict {
        resource: String,
        id: String,
        expected: u64,
        found: Option<u64>,
    },

    /// A conditional write found the entry at another version.
    #[error("stale write on {resource}/{id}: expected version {expected}, found {found:?}")]
    StaleWrite {
        resource: String,
        id: String,
        expected: u64,
        found: Option<u64>,
    },

    /// Error forwarded from the data provider.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
