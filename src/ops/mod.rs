//! Lifecycle operations.
//!
//! Every client request that changes account state runs as one
//! [`Operation`]: a tagged union of the nine operation kinds, each carrying
//! its own state enum. The [`engine`] drives any of them through the same
//! loop: enter a state, issue at most one asynchronous call, suspend until
//! the reply arrives, and continue until the operation reaches `Off` or is
//! killed.
//!
//! | Operation | Target | States |
//! |-----------|--------|--------|
//! | LoginAccount | connection | QueryAccountDb, CreateAccount, StoreAccountId, RetrieveAccount, SetAccount |
//! | CreateAvatar | account | RetrieveAccount, CreateAvatar, StoreAvatar |
//! | GetAvatars / DeleteAvatar | account | RetrieveAccount, ProcessDelete, QueryAvatars, SendAvatars |
//! | SetNameTyped | account | RetrieveAccount, RetrieveAvatar, JudgeName, StoreWishName |
//! | SetNamePattern | account | RetrieveAccount, RetrieveAvatar, SetName |
//! | AcknowledgeName | account | RetrieveAccount, GetTargetAvatar, CommitName |
//! | LoadAvatar | account | RetrieveAccount, GetTargetAvatar, SetAvatar |
//! | UnloadAvatar | account | UnloadAvatar |

mod activation;
mod avatars;
mod create_avatar;
pub mod engine;
mod login;
mod naming;

pub use activation::{LoadAvatar, UnloadAvatar};
pub use avatars::ListAvatars;
pub use create_avatar::CreateAvatar;
pub use engine::OpContext;
pub use login::LoginAccount;
pub use naming::{AcknowledgeName, SetNamePattern, SetNameTyped};

use crate::config::LoginConfig;
use crate::error::OperationError;
use crate::fabric::Fabric;
use crate::ids::{Channel, ObjectId};
use crate::namedb::AccountNameDb;
use crate::naming::{NameDictionary, NameJudge};
use crate::records::{AccountRecord, AvatarRecord, Record, WishNameState};
use crate::sessions::SessionTable;
use crate::store::{RecordStore, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by every operation.
pub struct Services {
    pub store: Arc<dyn RecordStore>,
    pub fabric: Arc<dyn Fabric>,
    pub namedb: AccountNameDb,
    pub judge: NameJudge,
    pub dictionary: NameDictionary,
    pub login: LoginConfig,
    /// Which connection holds each logged-in account.
    pub sessions: SessionTable,
    /// Deadline per outstanding reply; `None` waits forever.
    pub reply_timeout: Option<Duration>,
}

/// The actor an operation runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// A raw, not yet authenticated connection.
    Connection(Channel),
    /// A logged-in account; addressed through its account channel.
    Account(ObjectId),
}

impl Target {
    /// Channel that is ejected when the operation is killed.
    pub fn channel(self) -> Channel {
        match self {
            Self::Connection(channel) => channel,
            Self::Account(account) => Channel::account(account),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(channel) => write!(f, "connection:{channel}"),
            Self::Account(account) => write!(f, "account:{account}"),
        }
    }
}

/// What the engine does after a state handler returns.
#[derive(Debug)]
pub enum Step {
    /// The handler moved to a new state; enter it now.
    Enter,
    /// Wait for the reply to the call just issued.
    Suspend,
    /// Abort: eject the actor, then go Off.
    Kill(OperationError),
    /// Finished; release the guard.
    Off,
}

impl From<Result<(), OperationError>> for Step {
    fn from(result: Result<(), OperationError>) -> Self {
        match result {
            Ok(()) => Self::Enter,
            Err(err) => Self::Kill(err),
        }
    }
}

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Killed(OperationError),
}

/// Result of one asynchronous call, delivered back to the issuing operation.
#[derive(Debug)]
pub enum CallReply {
    Fetched {
        id: ObjectId,
        result: Result<Record, StoreError>,
    },
    Created(Result<ObjectId, StoreError>),
    Updated(Result<(), StoreError>),
    LoginLookup(Result<Option<ObjectId>, String>),
    LoginStored(Result<(), String>),
    NameRequested(Result<WishNameState, String>),
    /// Moderation verdict for a pending avatar, already written back.
    NameVerdict {
        id: ObjectId,
        result: Result<Option<WishNameState>, String>,
    },
}

/// Message delivered to a running operation's mailbox.
#[derive(Debug)]
pub enum OpEvent {
    /// A call reply tagged with the generation that issued it.
    Reply { generation: u64, reply: CallReply },
    /// Abort from outside (disconnect).
    Kill { error: OperationError },
}

/// Operation kind, used for guard-table bookkeeping, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    LoginAccount,
    CreateAvatar,
    GetAvatars,
    DeleteAvatar,
    SetNameTyped,
    SetNamePattern,
    AcknowledgeName,
    LoadAvatar,
    UnloadAvatar,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::LoginAccount => "LoginAccount",
            Self::CreateAvatar => "CreateAvatar",
            Self::GetAvatars => "GetAvatars",
            Self::DeleteAvatar => "DeleteAvatar",
            Self::SetNameTyped => "SetNameTyped",
            Self::SetNamePattern => "SetNamePattern",
            Self::AcknowledgeName => "AcknowledgeName",
            Self::LoadAvatar => "LoadAvatar",
            Self::UnloadAvatar => "UnloadAvatar",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One live lifecycle operation.
#[derive(Debug)]
pub enum Operation {
    Login(LoginAccount),
    CreateAvatar(CreateAvatar),
    ListAvatars(ListAvatars),
    SetNameTyped(SetNameTyped),
    SetNamePattern(SetNamePattern),
    AcknowledgeName(AcknowledgeName),
    LoadAvatar(LoadAvatar),
    UnloadAvatar(UnloadAvatar),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Login(_) => OperationKind::LoginAccount,
            Self::CreateAvatar(_) => OperationKind::CreateAvatar,
            Self::ListAvatars(op) if op.is_delete() => OperationKind::DeleteAvatar,
            Self::ListAvatars(_) => OperationKind::GetAvatars,
            Self::SetNameTyped(_) => OperationKind::SetNameTyped,
            Self::SetNamePattern(_) => OperationKind::SetNamePattern,
            Self::AcknowledgeName(_) => OperationKind::AcknowledgeName,
            Self::LoadAvatar(_) => OperationKind::LoadAvatar,
            Self::UnloadAvatar(_) => OperationKind::UnloadAvatar,
        }
    }

    pub fn target(&self) -> Target {
        match self {
            Self::Login(op) => Target::Connection(op.connection()),
            Self::CreateAvatar(op) => Target::Account(op.account_id()),
            Self::ListAvatars(op) => Target::Account(op.account_id()),
            Self::SetNameTyped(op) => Target::Account(op.account_id()),
            Self::SetNamePattern(op) => Target::Account(op.account_id()),
            Self::AcknowledgeName(op) => Target::Account(op.account_id()),
            Self::LoadAvatar(op) => Target::Account(op.account_id()),
            Self::UnloadAvatar(op) => Target::Account(op.account_id()),
        }
    }

    /// Name of the current state, for logs.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Login(op) => op.state_name(),
            Self::CreateAvatar(op) => op.state_name(),
            Self::ListAvatars(op) => op.state_name(),
            Self::SetNameTyped(op) => op.state_name(),
            Self::SetNamePattern(op) => op.state_name(),
            Self::AcknowledgeName(op) => op.state_name(),
            Self::LoadAvatar(op) => op.state_name(),
            Self::UnloadAvatar(op) => op.state_name(),
        }
    }

    /// Run the entry handler of the current state.
    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self {
            Self::Login(op) => op.enter(cx),
            Self::CreateAvatar(op) => op.enter(cx),
            Self::ListAvatars(op) => op.enter(cx),
            Self::SetNameTyped(op) => op.enter(cx),
            Self::SetNamePattern(op) => op.enter(cx),
            Self::AcknowledgeName(op) => op.enter(cx),
            Self::LoadAvatar(op) => op.enter(cx),
            Self::UnloadAvatar(op) => op.enter(cx),
        }
    }

    /// Deliver a reply to the current state.
    pub(crate) fn resume(&mut self, cx: &mut OpContext, reply: CallReply) -> Step {
        match self {
            Self::Login(op) => op.resume(cx, reply),
            Self::CreateAvatar(op) => op.resume(cx, reply),
            Self::ListAvatars(op) => op.resume(cx, reply),
            Self::SetNameTyped(op) => op.resume(cx, reply),
            Self::SetNamePattern(op) => op.resume(cx, reply),
            Self::AcknowledgeName(op) => op.resume(cx, reply),
            Self::LoadAvatar(op) => op.resume(cx, reply),
            Self::UnloadAvatar(op) => op.resume(cx, reply),
        }
    }
}

// ============================================================================
// Shared record checks
// ============================================================================

const ACCOUNT_NOT_FOUND: &str = "Your account object was not found in the database!";
const AVATAR_INVALID: &str = "One of the account's avatars is invalid!";

/// Unpack an account fetch, classifying every failure.
pub(crate) fn expect_account(result: Result<Record, StoreError>) -> Result<AccountRecord, OperationError> {
    match result {
        Ok(Record::Account(account)) => Ok(account),
        Ok(_) => Err(OperationError::Integrity(ACCOUNT_NOT_FOUND.to_string())),
        Err(err) => Err(OperationError::from_store(&err, ACCOUNT_NOT_FOUND)),
    }
}

/// Unpack an avatar fetch, classifying every failure.
pub(crate) fn expect_avatar(result: Result<Record, StoreError>) -> Result<AvatarRecord, OperationError> {
    match result {
        Ok(Record::Avatar(avatar)) => Ok(avatar),
        Ok(_) => Err(OperationError::Integrity(AVATAR_INVALID.to_string())),
        Err(err) => Err(OperationError::from_store(&err, AVATAR_INVALID)),
    }
}

/// Require the avatar to accept a new name.
pub(crate) fn require_open(avatar: &AvatarRecord) -> Result<(), OperationError> {
    if avatar.wish_name_state == WishNameState::Open {
        Ok(())
    } else {
        Err(OperationError::Integrity(
            "Avatar is not in a namable state!".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordType;

    #[test]
    fn target_channels() {
        assert_eq!(Target::Account(5).channel(), Channel::account(5));
        let conn = Channel(1_000_000_001);
        assert_eq!(Target::Connection(conn).channel(), conn);
    }

    #[test]
    fn wrong_record_kind_is_integrity_failure() {
        let err = expect_avatar(Ok(Record::Account(AccountRecord::new("a", 0)))).unwrap_err();
        assert_eq!(err, OperationError::Integrity(AVATAR_INVALID.into()));
    }

    #[test]
    fn missing_account_is_integrity_failure() {
        let err = expect_account(Err(StoreError::NotFound(3))).unwrap_err();
        assert_eq!(err.error_code(), "integrity");
        assert_eq!(err.to_string(), ACCOUNT_NOT_FOUND);

        let err = expect_account(Err(StoreError::TypeMismatch {
            id: 3,
            expected: RecordType::Account,
        }))
        .unwrap_err();
        assert_eq!(err.error_code(), "integrity");
    }

    #[test]
    fn backend_failure_is_store_failure() {
        let err = expect_account(Err(StoreError::Backend("disk".into()))).unwrap_err();
        assert_eq!(err.error_code(), "store_failure");
    }
}
