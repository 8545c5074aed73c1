//! Error types for Arcturus operations.

use thiserror::Error;

/// Result type alias using Arcturus's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during Arcturus operations.
///
/// Search itself never fails per result: payload read failures during result
/// resolution are logged and the affected result is dropped. Only the
/// surrounding collection operations return these errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Vector dimension differs from the collection dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A vector with the same ID already exists in the collection.
    #[error("duplicate vector id: {0}")]
    DuplicateId(String),

    /// A vector or query holds a NaN or infinite component.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Vector with the given ID was not found.
    #[error("vector not found: {0}")]
    VectorNotFound(String),

    /// Collection with the given name was not found.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Secondary index with the given name was not found.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// A collection with the given name already exists.
    #[error("collection already exists: {0}")]
    CollectionExists(String),

    /// A secondary index with the given name already exists.
    #[error("index already exists: {0}")]
    IndexExists(String),

    /// Invalid or unreadable configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The vector or payload store failed.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// A background secondary index update failed.
    #[error("index maintenance failed: {0}")]
    IndexMaintenance(String),

    /// A blocking task offloaded from an async runtime panicked or was
    /// cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Returns true for the "referenced entity does not exist" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::VectorNotFound(_) | Error::CollectionNotFound(_) | Error::IndexNotFound(_)
        )
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Error::StorageFailure(format!("{}: {}", context, err))
    }
}
