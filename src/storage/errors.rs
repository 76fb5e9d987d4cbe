//! Storage error types

use thiserror::Error;

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a database session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// A unique field already holds this value
    #[error("{model}.{field} must be unique")]
    UniqueViolation { model: String, field: String },

    /// Row does not exist
    #[error("{model} {id} not found")]
    NotFound { model: String, id: String },

    /// Commit or rollback called with no open transaction
    #[error("no transaction in progress")]
    NoTransaction,

    /// Backend failure (poisoned lock, I/O, driver error)
    #[error("storage backend failure: {0}")]
    Backend(String),
}
