//! Object ids and channel addresses.
//!
//! The server fabric routes by 64-bit channel numbers. A connected client's
//! sender identity packs the account id in the high 32 bits and the active
//! avatar id in the low 32 bits; a pre-login connection has nothing in the
//! high half.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable record id. `0` means "none" (an empty slot, no estate).
pub type ObjectId = u32;

/// Channel prefix for the per-account connection channel.
pub const ACCOUNT_CHANNEL_PREFIX: u64 = 1003 << 32;

/// Channel prefix for an avatar's dedicated (puppet) channel.
pub const PUPPET_CHANNEL_PREFIX: u64 = 1001 << 32;

/// A routable channel address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(pub u64);

impl Channel {
    /// The channel every connection logged into `account` subscribes to.
    pub fn account(account: ObjectId) -> Self {
        Self(ACCOUNT_CHANNEL_PREFIX | account as u64)
    }

    /// The channel an active avatar's connection subscribes to.
    pub fn puppet(avatar: ObjectId) -> Self {
        Self(PUPPET_CHANNEL_PREFIX | avatar as u64)
    }

    /// The sender identity of a connection bound to `account` and `avatar`.
    pub fn identity(account: ObjectId, avatar: ObjectId) -> Self {
        Self(((account as u64) << 32) | avatar as u64)
    }

    /// Account id encoded in a sender identity (0 before login).
    pub fn account_id(self) -> ObjectId {
        (self.0 >> 32) as ObjectId
    }

    /// Avatar id encoded in a sender identity (0 when none is active).
    pub fn avatar_id(self) -> ObjectId {
        (self.0 & 0xFFFF_FFFF) as ObjectId
    }

    /// Whether this sender already carries an account binding.
    pub fn is_authenticated(self) -> bool {
        self.account_id() != 0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
