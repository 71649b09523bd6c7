//! In-memory record store.

use super::{RecordStore, StoreError};
use crate::ids::ObjectId;
use crate::records::{Field, Record, RecordType, apply_update};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// First id handed out; mirrors the durable id range of the object database.
const FIRST_OBJECT_ID: ObjectId = 100_000_000;

/// DashMap-backed store. Guarded updates hold the entry's shard lock for
/// the compare-and-apply, so they are atomic per key.
pub struct MemoryRecordStore {
    records: DashMap<ObjectId, Record>,
    next_id: AtomicU32,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU32::new(FIRST_OBJECT_ID),
        }
    }

    /// Insert a record under a caller-chosen id (fixtures, imports).
    pub fn insert(&self, id: ObjectId, record: Record) {
        self.records.insert(id, record);
    }

    /// Snapshot a record without going through the async interface.
    pub fn get(&self, id: ObjectId) -> Option<Record> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch(&self, id: ObjectId) -> Result<Record, StoreError> {
        self.get(id).ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, record: Record) -> Result<ObjectId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.records.insert(id, record);
        Ok(id)
    }

    async fn update(
        &self,
        id: ObjectId,
        kind: RecordType,
        changes: Vec<Field>,
        expected: Vec<Field>,
    ) -> Result<(), StoreError> {
        let mut entry = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_update(id, entry.value_mut(), kind, &changes, &expected)
    }
}
