//! # Storage
//!
//! The session interface the kernel drives transactions through, plus an
//! in-memory implementation with savepoints and unique constraints.
//!
//! A [`Database`] hands out one [`DbSession`] per call. The session owns the
//! transaction state; nothing about it is shared with other calls until commit.

mod errors;
mod memory;

pub use errors::{StorageError, StorageResult};
pub use memory::InMemoryDatabase;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A stored row
pub type Record = Map<String, Value>;

/// Per-call database session
#[async_trait]
pub trait DbSession: Send + Sync {
    /// Open a transaction, or push a savepoint when one is already open
    async fn begin(&mut self) -> StorageResult<()>;

    /// Commit the innermost level. Releasing a savepoint keeps its writes
    /// staged; committing the outer level publishes them.
    async fn commit(&mut self) -> StorageResult<()>;

    /// Discard the writes of the innermost level
    async fn rollback(&mut self) -> StorageResult<()>;

    /// Whether a transaction is open on this session
    fn in_transaction(&self) -> bool;

    /// Open nesting levels (0 = none, 1 = top level, >1 = savepoints)
    fn depth(&self) -> usize;

    /// Fetch one row, seeing this session's staged writes
    async fn get(&self, model: &str, id: &str) -> StorageResult<Option<Record>>;

    /// Rows whose fields equal every filter value, in insertion order
    async fn list(&self, model: &str, filters: &Record) -> StorageResult<Vec<Record>>;

    /// Insert or overwrite a row
    async fn add(&mut self, model: &str, id: &str, row: Record) -> StorageResult<()>;

    /// Remove a row, returning whether it existed
    async fn delete(&mut self, model: &str, id: &str) -> StorageResult<bool>;
}

/// Session factory shared by every call
pub trait Database: Send + Sync {
    /// Open a fresh session
    fn session(&self) -> Box<dyn DbSession>;

    /// Declare fields that must hold distinct values within a model
    fn declare_unique(&self, _model: &str, _fields: &[String]) {}
}
