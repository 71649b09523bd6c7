//! Record store interface.
//!
//! The engine only needs durable single-key fetch, create, and
//! compare-and-update. Two backends are provided:
//! - [`MemoryRecordStore`]: DashMap-backed, for tests and ephemeral servers
//! - [`SqliteRecordStore`]: SQLx/SQLite, records stored as JSON with a version

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::ids::ObjectId;
use crate::records::{Field, Record, RecordType};
use async_trait::async_trait;
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(ObjectId),
    #[error("expected-value guard failed on object {0}")]
    GuardMismatch(ObjectId),
    #[error("object {id} is not a {expected} record")]
    TypeMismatch { id: ObjectId, expected: RecordType },
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("record store failure: {0}")]
    Backend(String),
}

/// Async record store keyed by object id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record. The returned variant carries the type tag.
    async fn fetch(&self, id: ObjectId) -> Result<Record, StoreError>;

    /// Persist a new record and return its freshly allocated id (never 0).
    async fn create(&self, record: Record) -> Result<ObjectId, StoreError>;

    /// Apply `changes` to a record of type `kind`.
    ///
    /// When `expected` is non-empty every field in it must still hold its
    /// given value, otherwise the update fails with
    /// [`StoreError::GuardMismatch`] and nothing is written.
    async fn update(
        &self,
        id: ObjectId,
        kind: RecordType,
        changes: Vec<Field>,
        expected: Vec<Field>,
    ) -> Result<(), StoreError>;
}
