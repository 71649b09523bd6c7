//! Account records: six avatar slots plus a capped deletion history.

use crate::ids::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of avatar slots on every account.
pub const AVATAR_SLOTS: usize = 6;

/// Maximum number of entries retained in the deletion log.
pub const DELETION_LOG_CAPACITY: usize = 100;

/// Slot table. Position is meaningful to the client; `0` marks an empty slot.
pub type AvatarSlots = [ObjectId; AVATAR_SLOTS];

/// One deletion log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedAvatar {
    pub avatar_id: ObjectId,
    /// Unix timestamp of the deletion.
    pub deleted_at: i64,
}

/// Append-only ring of deleted avatars; the oldest entry is evicted on overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeletionLog(VecDeque<DeletedAvatar>);

impl DeletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deletion, evicting the oldest entry when full.
    pub fn push(&mut self, avatar_id: ObjectId, deleted_at: i64) {
        while self.0.len() >= DELETION_LOG_CAPACITY {
            self.0.pop_front();
        }
        self.0.push_back(DeletedAvatar {
            avatar_id,
            deleted_at,
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, avatar_id: ObjectId) -> bool {
        self.0.iter().any(|entry| entry.avatar_id == avatar_id)
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &DeletedAvatar> {
        self.0.iter()
    }
}

/// A durable account, created on the first login of an unknown identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// External login identity this account was created for.
    pub login_id: String,
    pub avatar_slots: AvatarSlots,
    #[serde(default)]
    pub deleted_avatars: DeletionLog,
    /// Shared-property (estate) record, `0` when the account has none.
    #[serde(default)]
    pub estate_id: ObjectId,
    /// Unix timestamp; `0` when unknown.
    pub created_at: i64,
    pub last_login: i64,
}

impl AccountRecord {
    /// A fresh account with every slot empty.
    pub fn new(login_id: impl Into<String>, now: i64) -> Self {
        Self {
            login_id: login_id.into(),
            avatar_slots: [0; AVATAR_SLOTS],
            deleted_avatars: DeletionLog::new(),
            estate_id: 0,
            created_at: now,
            last_login: now,
        }
    }

    /// Slot index holding `avatar_id`. Never matches the empty marker.
    pub fn slot_of(&self, avatar_id: ObjectId) -> Option<usize> {
        if avatar_id == 0 {
            return None;
        }
        self.avatar_slots.iter().position(|&id| id == avatar_id)
    }

    pub fn owns(&self, avatar_id: ObjectId) -> bool {
        self.slot_of(avatar_id).is_some()
    }

    pub fn estate(&self) -> Option<ObjectId> {
        (self.estate_id != 0).then_some(self.estate_id)
    }

    /// Occupied slots as `(index, avatar_id)` in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, ObjectId)> + '_ {
        self.avatar_slots
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, id)| id != 0)
    }

    /// Whole days elapsed since creation, or `None` when the date is unknown.
    pub fn days_since_creation(&self, now: i64) -> Option<i64> {
        if self.created_at <= 0 {
            return None;
        }
        Some(((now - self.created_at) / 86_400).abs())
    }
}
