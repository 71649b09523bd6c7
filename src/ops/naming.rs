//! SetNameTyped, SetNamePattern and AcknowledgeName.

use super::{CallReply, OpContext, Step, expect_account, expect_avatar, require_open};
use crate::error::OperationError;
use crate::ids::ObjectId;
use crate::protocol::{ClientResponse, NamePart};
use crate::records::{AvatarRecord, Field, Record, RecordType, WishNameState};
use crate::store::StoreError;
use crate::telemetry::audit;
use tracing::warn;

/// Fetch-account step shared by the three naming operations: check
/// membership and move on to the avatar fetch.
fn owned_avatar(
    result: Result<Record, StoreError>,
    avatar_id: ObjectId,
    not_owned: &str,
) -> Result<(), OperationError> {
    let account = expect_account(result)?;
    if account.owns(avatar_id) {
        Ok(())
    } else {
        Err(OperationError::Integrity(not_owned.to_string()))
    }
}

// ============================================================================
// SetNameTyped
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypedState {
    Start,
    RetrieveAccount,
    RetrieveAvatar,
    JudgeName,
    StoreWishName,
}

/// Submit a free-typed name for moderation.
///
/// With `avatar_id == 0` the name is only judged; nothing is recorded.
#[derive(Debug)]
pub struct SetNameTyped {
    account_id: ObjectId,
    avatar_id: ObjectId,
    name: String,
    state: TypedState,
}

impl SetNameTyped {
    pub fn new(account_id: ObjectId, avatar_id: ObjectId, name: String) -> Self {
        Self {
            account_id,
            avatar_id,
            name,
            state: TypedState::Start,
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            TypedState::Start => "Start",
            TypedState::RetrieveAccount => "RetrieveAccount",
            TypedState::RetrieveAvatar => "RetrieveAvatar",
            TypedState::JudgeName => "JudgeName",
            TypedState::StoreWishName => "StoreWishName",
        }
    }

    fn demand(&mut self, state: TypedState) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            TypedState::Start if self.avatar_id == 0 => self.demand(TypedState::JudgeName),
            TypedState::Start => self.demand(TypedState::RetrieveAccount),
            TypedState::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            TypedState::RetrieveAvatar => {
                cx.fetch(self.avatar_id);
                Step::Suspend
            }
            TypedState::JudgeName => {
                let accepted = cx.services().judge.judge(&self.name);
                if accepted && self.avatar_id != 0 {
                    cx.add_name_request(self.avatar_id, self.name.clone());
                    Step::Suspend
                } else {
                    self.finish(cx, accepted)
                }
            }
            TypedState::StoreWishName => {
                cx.update(
                    self.avatar_id,
                    RecordType::Avatar,
                    vec![
                        Field::WishNameState(WishNameState::Pending),
                        Field::WishName(self.name.clone()),
                    ],
                    vec![Field::WishNameState(WishNameState::Open)],
                );
                Step::Suspend
            }
        }
    }

    pub(crate) fn resume(&mut self, cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (TypedState::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                match owned_avatar(result, self.avatar_id, "Tried to name an avatar not in the account!") {
                    Ok(()) => self.demand(TypedState::RetrieveAvatar),
                    Err(err) => Step::Kill(err),
                }
            }
            (TypedState::RetrieveAvatar, CallReply::Fetched { result, .. }) => {
                match expect_avatar(result).and_then(|avatar| require_open(&avatar)) {
                    Ok(()) => self.demand(TypedState::JudgeName),
                    Err(err) => Step::Kill(err),
                }
            }
            (TypedState::JudgeName, CallReply::NameRequested(result)) => match result {
                Ok(_) => self.demand(TypedState::StoreWishName),
                Err(e) => {
                    warn!(avatar_id = self.avatar_id, error = %e, "Name request not recorded");
                    self.finish(cx, false)
                }
            },
            (TypedState::StoreWishName, CallReply::Updated(result)) => match result {
                Ok(()) => self.finish(cx, true),
                Err(e) => {
                    // The avatar stays OPEN; its ledger entry must not outlive it.
                    cx.remove_name_request(self.avatar_id);
                    Step::Kill(OperationError::from_store(
                        &e,
                        "Database failed to record the requested name!",
                    ))
                }
            },
            _ => Step::Suspend,
        }
    }

    fn finish(&self, cx: &mut OpContext, accepted: bool) -> Step {
        if self.avatar_id != 0 {
            audit!("avatarWishname", avatar_id = self.avatar_id, name = %self.name, accepted);
        }
        match cx.reply(ClientResponse::NameTypedResult {
            avatar_id: self.avatar_id,
            accepted,
        }) {
            Ok(()) => Step::Off,
            Err(err) => Step::Kill(err),
        }
    }
}

// ============================================================================
// SetNamePattern
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternState {
    Start,
    RetrieveAccount,
    RetrieveAvatar,
    SetName,
}

/// Name an avatar from dictionary parts. Applied immediately, no moderation.
#[derive(Debug)]
pub struct SetNamePattern {
    account_id: ObjectId,
    avatar_id: ObjectId,
    parts: [NamePart; 4],
    state: PatternState,
    name: String,
}

impl SetNamePattern {
    pub fn new(account_id: ObjectId, avatar_id: ObjectId, parts: [NamePart; 4]) -> Self {
        Self {
            account_id,
            avatar_id,
            parts,
            state: PatternState::Start,
            name: String::new(),
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            PatternState::Start => "Start",
            PatternState::RetrieveAccount => "RetrieveAccount",
            PatternState::RetrieveAvatar => "RetrieveAvatar",
            PatternState::SetName => "SetName",
        }
    }

    fn demand(&mut self, state: PatternState) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            PatternState::Start => self.demand(PatternState::RetrieveAccount),
            PatternState::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            PatternState::RetrieveAvatar => {
                cx.fetch(self.avatar_id);
                Step::Suspend
            }
            PatternState::SetName => {
                self.name = cx.services().dictionary.render(&self.parts);
                if self.name.is_empty() {
                    return Step::Kill(OperationError::Validation(
                        "Invalid name pattern specified!".to_string(),
                    ));
                }
                cx.update(
                    self.avatar_id,
                    RecordType::Avatar,
                    vec![
                        Field::DisplayName(self.name.clone()),
                        Field::WishName(String::new()),
                        Field::WishNameState(WishNameState::Unset),
                    ],
                    vec![Field::WishNameState(WishNameState::Open)],
                );
                Step::Suspend
            }
        }
    }

    pub(crate) fn resume(&mut self, cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (PatternState::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                match owned_avatar(result, self.avatar_id, "Tried to name an avatar not in the account!") {
                    Ok(()) => self.demand(PatternState::RetrieveAvatar),
                    Err(err) => Step::Kill(err),
                }
            }
            (PatternState::RetrieveAvatar, CallReply::Fetched { result, .. }) => {
                match expect_avatar(result).and_then(|avatar| require_open(&avatar)) {
                    Ok(()) => self.demand(PatternState::SetName),
                    Err(err) => Step::Kill(err),
                }
            }
            (PatternState::SetName, CallReply::Updated(result)) => {
                if let Err(e) = result {
                    return Step::Kill(OperationError::from_store(
                        &e,
                        "Database failed to set the avatar name!",
                    ));
                }
                audit!("avatarNamed", avatar_id = self.avatar_id, name = %self.name);
                match cx.reply(ClientResponse::NamePatternResult {
                    avatar_id: self.avatar_id,
                    accepted: true,
                }) {
                    Ok(()) => Step::Off,
                    Err(err) => Step::Kill(err),
                }
            }
            _ => Step::Suspend,
        }
    }
}

// ============================================================================
// AcknowledgeName
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Start,
    RetrieveAccount,
    GetTargetAvatar,
    CommitName,
}

/// Acknowledge a moderation verdict: commit an approved name or reopen a
/// rejected one.
#[derive(Debug)]
pub struct AcknowledgeName {
    account_id: ObjectId,
    avatar_id: ObjectId,
    state: AckState,
    before: Option<AvatarRecord>,
}

impl AcknowledgeName {
    pub fn new(account_id: ObjectId, avatar_id: ObjectId) -> Self {
        Self {
            account_id,
            avatar_id,
            state: AckState::Start,
            before: None,
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            AckState::Start => "Start",
            AckState::RetrieveAccount => "RetrieveAccount",
            AckState::GetTargetAvatar => "GetTargetAvatar",
            AckState::CommitName => "CommitName",
        }
    }

    fn demand(&mut self, state: AckState) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            AckState::Start => self.demand(AckState::RetrieveAccount),
            AckState::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            AckState::GetTargetAvatar => {
                cx.fetch(self.avatar_id);
                Step::Suspend
            }
            AckState::CommitName => {
                let Some(before) = self.before.clone() else {
                    return self.demand(AckState::GetTargetAvatar);
                };
                let mut after = before.clone();
                if let Err(e) = after.acknowledge() {
                    return Step::Kill(OperationError::Integrity(format!(
                        "Tried to acknowledge name on an avatar in {} state!",
                        e.from.as_str()
                    )));
                }
                cx.remove_name_request(self.avatar_id);
                cx.update(
                    self.avatar_id,
                    RecordType::Avatar,
                    vec![
                        Field::WishNameState(after.wish_name_state),
                        Field::WishName(after.wish_name),
                        Field::DisplayName(after.display_name),
                    ],
                    vec![
                        Field::WishNameState(before.wish_name_state),
                        Field::WishName(before.wish_name),
                        Field::DisplayName(before.display_name),
                    ],
                );
                Step::Suspend
            }
        }
    }

    pub(crate) fn resume(&mut self, cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (AckState::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                match owned_avatar(
                    result,
                    self.avatar_id,
                    "Tried to acknowledge name on an avatar not in the account!",
                ) {
                    Ok(()) => self.demand(AckState::GetTargetAvatar),
                    Err(err) => Step::Kill(err),
                }
            }
            (AckState::GetTargetAvatar, CallReply::Fetched { result, .. }) => {
                match expect_avatar(result) {
                    Ok(avatar) => {
                        self.before = Some(avatar);
                        self.demand(AckState::CommitName)
                    }
                    Err(err) => Step::Kill(err),
                }
            }
            (AckState::CommitName, CallReply::Updated(result)) => {
                if let Err(e) = result {
                    return Step::Kill(OperationError::from_store(
                        &e,
                        "Database failed to commit the avatar name!",
                    ));
                }
                match cx.reply(ClientResponse::NameAcknowledged) {
                    Ok(()) => Step::Off,
                    Err(err) => Step::Kill(err),
                }
            }
            _ => Step::Suspend,
        }
    }
}
