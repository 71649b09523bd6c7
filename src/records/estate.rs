//! Shared-property (estate) records with one reserved area per avatar slot.

use super::account::{AVATAR_SLOTS, AvatarSlots};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstateRecord {
    /// Avatar living in each slot's house, `0` when vacant.
    pub slot_avatars: AvatarSlots,
    /// Item ids kept in each slot's house.
    pub slot_items: [Vec<u32>; AVATAR_SLOTS],
}

impl EstateRecord {
    pub fn new() -> Self {
        Self::default()
    }
}
