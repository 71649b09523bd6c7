//! Durable record types and field-level updates.
//!
//! The record store holds typed [`Record`]s keyed by [`ObjectId`]. Updates
//! are expressed as lists of [`Field`] assignments; an optional second list
//! of `Field`s is the expected-previous-value snapshot that must still match
//! for the update to apply.

mod account;
mod avatar;
mod estate;

pub use account::{
    AVATAR_SLOTS, AccountRecord, AvatarSlots, DELETION_LOG_CAPACITY, DeletedAvatar, DeletionLog,
};
pub use avatar::{AvatarRecord, FriendEntry, NameState, NameTransitionError, WishNameState};
pub use estate::EstateRecord;

use crate::ids::ObjectId;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Account,
    Avatar,
    Estate,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Avatar => "Avatar",
            Self::Estate => "Estate",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed durable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields")]
pub enum Record {
    Account(AccountRecord),
    Avatar(AvatarRecord),
    Estate(EstateRecord),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Account(_) => RecordType::Account,
            Self::Avatar(_) => RecordType::Avatar,
            Self::Estate(_) => RecordType::Estate,
        }
    }

    pub fn into_account(self) -> Option<AccountRecord> {
        match self {
            Self::Account(account) => Some(account),
            _ => None,
        }
    }

    pub fn into_avatar(self) -> Option<AvatarRecord> {
        match self {
            Self::Avatar(avatar) => Some(avatar),
            _ => None,
        }
    }
}

/// One field of a record, with its value.
///
/// Used both as an assignment and as an expected-previous-value guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    AvatarSlots(AvatarSlots),
    DeletedAvatars(DeletionLog),
    LastLogin(i64),
    LoginId(String),
    DisplayName(String),
    WishName(String),
    WishNameState(WishNameState),
    EstateSlot {
        index: usize,
        avatar_id: ObjectId,
        items: Vec<u32>,
    },
}

impl Field {
    /// The record type this field belongs to.
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::AvatarSlots(_)
            | Self::DeletedAvatars(_)
            | Self::LastLogin(_)
            | Self::LoginId(_) => RecordType::Account,
            Self::DisplayName(_) | Self::WishName(_) | Self::WishNameState(_) => {
                RecordType::Avatar
            }
            Self::EstateSlot { .. } => RecordType::Estate,
        }
    }

    /// Whether `record` currently holds this value.
    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (Self::AvatarSlots(v), Record::Account(a)) => a.avatar_slots == *v,
            (Self::DeletedAvatars(v), Record::Account(a)) => a.deleted_avatars == *v,
            (Self::LastLogin(v), Record::Account(a)) => a.last_login == *v,
            (Self::LoginId(v), Record::Account(a)) => a.login_id == *v,
            (Self::DisplayName(v), Record::Avatar(a)) => a.display_name == *v,
            (Self::WishName(v), Record::Avatar(a)) => a.wish_name == *v,
            (Self::WishNameState(v), Record::Avatar(a)) => a.wish_name_state == *v,
            (
                Self::EstateSlot {
                    index,
                    avatar_id,
                    items,
                },
                Record::Estate(e),
            ) => {
                e.slot_avatars.get(*index) == Some(avatar_id)
                    && e.slot_items.get(*index) == Some(items)
            }
            _ => false,
        }
    }

    /// Write this value into `record`.
    pub fn apply(&self, id: ObjectId, record: &mut Record) -> Result<(), StoreError> {
        match (self, record) {
            (Self::AvatarSlots(v), Record::Account(a)) => a.avatar_slots = *v,
            (Self::DeletedAvatars(v), Record::Account(a)) => a.deleted_avatars = v.clone(),
            (Self::LastLogin(v), Record::Account(a)) => a.last_login = *v,
            (Self::LoginId(v), Record::Account(a)) => a.login_id = v.clone(),
            (Self::DisplayName(v), Record::Avatar(a)) => a.display_name = v.clone(),
            (Self::WishName(v), Record::Avatar(a)) => a.wish_name = v.clone(),
            (Self::WishNameState(v), Record::Avatar(a)) => a.wish_name_state = *v,
            (
                Self::EstateSlot {
                    index,
                    avatar_id,
                    items,
                },
                Record::Estate(e),
            ) => {
                if *index >= AVATAR_SLOTS {
                    return Err(StoreError::InvalidField(format!(
                        "estate slot {index} out of range"
                    )));
                }
                e.slot_avatars[*index] = *avatar_id;
                e.slot_items[*index] = items.clone();
            }
            (field, _) => {
                return Err(StoreError::TypeMismatch {
                    id,
                    expected: field.record_type(),
                });
            }
        }
        Ok(())
    }
}

/// Apply a guarded field update to an in-memory record.
///
/// Shared by every [`RecordStore`](crate::store::RecordStore) backend so the
/// guard semantics are identical everywhere.
pub fn apply_update(
    id: ObjectId,
    record: &mut Record,
    kind: RecordType,
    changes: &[Field],
    expected: &[Field],
) -> Result<(), StoreError> {
    if record.record_type() != kind {
        return Err(StoreError::TypeMismatch { id, expected: kind });
    }
    if let Some(field) = changes
        .iter()
        .chain(expected)
        .find(|f| f.record_type() != kind)
    {
        return Err(StoreError::TypeMismatch {
            id,
            expected: field.record_type(),
        });
    }
    if !expected.iter().all(|field| field.matches(record)) {
        return Err(StoreError::GuardMismatch(id));
    }

    let mut updated = record.clone();
    for field in changes {
        field.apply(id, &mut updated)?;
    }
    *record = updated;
    Ok(())
}
