//! Avatar records and the wish-name state machine.
//!
//! ```text
//! ""/OPEN ──request──► PENDING ──verdict──► APPROVED ──ack──► "" (named)
//!                                    └────► REJECTED ──ack──► OPEN
//! ```
//!
//! Pattern naming skips moderation and moves OPEN straight to "".

use crate::dna::AvatarDna;
use crate::ids::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Moderation state of an avatar's proposed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WishNameState {
    /// Named; no wish outstanding.
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl WishNameState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Open => "OPEN",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Client-facing code used in avatar listings.
    pub fn name_state(self) -> NameState {
        match self {
            Self::Unset => NameState::None,
            Self::Open => NameState::Open,
            Self::Pending => NameState::Pending,
            Self::Approved => NameState::Approved,
            Self::Rejected => NameState::Rejected,
        }
    }
}

impl fmt::Display for WishNameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Name state as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum NameState {
    None = 0,
    Open = 1,
    Pending = 2,
    Approved = 3,
    Rejected = 4,
}

impl From<NameState> for u8 {
    fn from(state: NameState) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for NameState {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Open),
            2 => Ok(Self::Pending),
            3 => Ok(Self::Approved),
            4 => Ok(Self::Rejected),
            other => Err(format!("unknown name state {other}")),
        }
    }
}

/// Illegal wish-name transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a name in {from} state")]
pub struct NameTransitionError {
    pub action: &'static str,
    pub from: WishNameState,
}

/// A friends-list entry: friend avatar id plus flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub avatar_id: ObjectId,
    pub flags: u8,
}

/// A playable persona owned by one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRecord {
    /// Owning account (informational; ownership is the account's slot table).
    pub account_id: ObjectId,
    pub display_name: String,
    #[serde(default)]
    pub wish_name: String,
    pub wish_name_state: WishNameState,
    pub dna: AvatarDna,
    #[serde(default)]
    pub friends: Vec<FriendEntry>,
}

impl AvatarRecord {
    /// A new avatar carrying its DNA placeholder name and an open name slot.
    pub fn new(account_id: ObjectId, dna: AvatarDna) -> Self {
        Self {
            account_id,
            display_name: dna.placeholder_name(),
            wish_name: String::new(),
            wish_name_state: WishNameState::Open,
            dna,
            friends: Vec::new(),
        }
    }

    pub fn friend_ids(&self) -> Vec<ObjectId> {
        self.friends.iter().map(|f| f.avatar_id).collect()
    }

    /// OPEN → PENDING with `name` as the wish.
    pub fn request_name(&mut self, name: &str) -> Result<(), NameTransitionError> {
        self.require_open("request")?;
        self.wish_name_state = WishNameState::Pending;
        self.wish_name = name.to_string();
        Ok(())
    }

    /// OPEN → named, bypassing moderation.
    pub fn apply_pattern_name(&mut self, name: &str) -> Result<(), NameTransitionError> {
        self.require_open("set")?;
        self.wish_name_state = WishNameState::Unset;
        self.wish_name.clear();
        self.display_name = name.to_string();
        Ok(())
    }

    /// PENDING → verdict. Other states are left untouched.
    pub fn apply_verdict(&mut self, verdict: WishNameState) -> Result<bool, NameTransitionError> {
        if self.wish_name_state != WishNameState::Pending {
            return Ok(false);
        }
        match verdict {
            WishNameState::Pending => Ok(false),
            WishNameState::Approved | WishNameState::Rejected => {
                self.wish_name_state = verdict;
                Ok(true)
            }
            _ => Err(NameTransitionError {
                action: "moderate",
                from: self.wish_name_state,
            }),
        }
    }

    /// APPROVED commits the wish; REJECTED reopens the slot.
    pub fn acknowledge(&mut self) -> Result<(), NameTransitionError> {
        match self.wish_name_state {
            WishNameState::Approved => {
                self.display_name = std::mem::take(&mut self.wish_name);
                self.wish_name_state = WishNameState::Unset;
                Ok(())
            }
            WishNameState::Rejected => {
                self.wish_name.clear();
                self.wish_name_state = WishNameState::Open;
                Ok(())
            }
            from => Err(NameTransitionError {
                action: "acknowledge",
                from,
            }),
        }
    }

    fn require_open(&self, action: &'static str) -> Result<(), NameTransitionError> {
        if self.wish_name_state == WishNameState::Open {
            Ok(())
        } else {
            Err(NameTransitionError {
                action,
                from: self.wish_name_state,
            })
        }
    }
}
