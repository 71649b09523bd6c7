//! LoadAvatar and UnloadAvatar: put an avatar in play and take it out again.
//!
//! Both address the account's connection through its account channel, so
//! every fabric command below reaches whichever connection holds the account.

use super::{CallReply, OpContext, Step, expect_account, expect_avatar};
use crate::error::OperationError;
use crate::fabric::{AccessLevel, CleanupAction, FabricCommand, PresenceEvent};
use crate::ids::{Channel, ObjectId};
use crate::protocol::ClientResponse;
use crate::records::{AccountRecord, AvatarRecord};
use crate::telemetry::audit;
use chrono::Utc;

/// Reported when the account's creation date is unknown.
const UNKNOWN_ACCOUNT_DAYS: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Start,
    RetrieveAccount,
    GetTargetAvatar,
    SetAvatar,
}

#[derive(Debug)]
pub struct LoadAvatar {
    account_id: ObjectId,
    avatar_id: ObjectId,
    state: LoadState,
    account: Option<AccountRecord>,
    avatar: Option<AvatarRecord>,
}

impl LoadAvatar {
    pub fn new(account_id: ObjectId, avatar_id: ObjectId) -> Self {
        Self {
            account_id,
            avatar_id,
            state: LoadState::Start,
            account: None,
            avatar: None,
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub fn avatar_id(&self) -> ObjectId {
        self.avatar_id
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            LoadState::Start => "Start",
            LoadState::RetrieveAccount => "RetrieveAccount",
            LoadState::GetTargetAvatar => "GetTargetAvatar",
            LoadState::SetAvatar => "SetAvatar",
        }
    }

    fn demand(&mut self, state: LoadState) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            LoadState::Start => self.demand(LoadState::RetrieveAccount),
            LoadState::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            LoadState::GetTargetAvatar => {
                cx.fetch(self.avatar_id);
                Step::Suspend
            }
            LoadState::SetAvatar => match self.set_avatar(cx) {
                Ok(()) => Step::Off,
                Err(err) => Step::Kill(err),
            },
        }
    }

    pub(crate) fn resume(&mut self, _cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (LoadState::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                let account = match expect_account(result) {
                    Ok(account) => account,
                    Err(err) => return Step::Kill(err),
                };
                if !account.owns(self.avatar_id) {
                    return Step::Kill(OperationError::Integrity(
                        "Tried to play an avatar not in the account!".to_string(),
                    ));
                }
                self.account = Some(account);
                self.demand(LoadState::GetTargetAvatar)
            }
            (LoadState::GetTargetAvatar, CallReply::Fetched { result, .. }) => {
                match expect_avatar(result) {
                    Ok(avatar) => {
                        self.avatar = Some(avatar);
                        self.demand(LoadState::SetAvatar)
                    }
                    Err(err) => Step::Kill(err),
                }
            }
            _ => Step::Suspend,
        }
    }

    fn set_avatar(&self, cx: &OpContext) -> Result<(), OperationError> {
        let (account_id, avatar_id) = (self.account_id, self.avatar_id);
        let conn = Channel::account(account_id);
        let fabric = cx.fabric();

        // Registered first so a drop mid-sequence still deletes the object.
        fabric.add_disconnect_cleanup(conn, CleanupAction::DeleteObject { object: avatar_id })?;

        let days = self
            .account
            .as_ref()
            .and_then(|a| a.days_since_creation(Utc::now().timestamp()))
            .unwrap_or(UNKNOWN_ACCOUNT_DAYS);
        fabric.send(conn, ClientResponse::AccountDays { days })?;

        cx.post(FabricCommand::Activate {
            object: avatar_id,
            access: AccessLevel::Full,
        })?;
        fabric.open_channel(conn, Channel::puppet(avatar_id))?;
        cx.post(FabricCommand::AddSessionObject {
            connection: conn,
            object: avatar_id,
        })?;
        fabric.set_identity(conn, Channel::identity(account_id, avatar_id))?;
        cx.post(FabricCommand::GrantOwnership {
            connection: conn,
            object: avatar_id,
        })?;

        let friends = self.avatar.as_ref().map(AvatarRecord::friend_ids).unwrap_or_default();
        cx.post(FabricCommand::Presence(PresenceEvent::ComingOnline { avatar_id, friends }))?;
        fabric.add_disconnect_cleanup(
            conn,
            CleanupAction::Presence(PresenceEvent::GoingOffline { avatar_id }),
        )?;

        audit!("avatarChosen", avatar_id, account_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnloadState {
    Start,
    UnloadAvatar,
}

/// Takes the active avatar out of play. Issues no asynchronous calls.
#[derive(Debug)]
pub struct UnloadAvatar {
    account_id: ObjectId,
    avatar_id: ObjectId,
    state: UnloadState,
}

impl UnloadAvatar {
    pub fn new(account_id: ObjectId, avatar_id: ObjectId) -> Self {
        Self {
            account_id,
            avatar_id,
            state: UnloadState::Start,
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            UnloadState::Start => "Start",
            UnloadState::UnloadAvatar => "UnloadAvatar",
        }
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            UnloadState::Start => {
                self.state = UnloadState::UnloadAvatar;
                Step::Enter
            }
            UnloadState::UnloadAvatar => match self.unload(cx) {
                Ok(()) => Step::Off,
                Err(err) => Step::Kill(err),
            },
        }
    }

    pub(crate) fn resume(&mut self, _cx: &mut OpContext, _reply: CallReply) -> Step {
        Step::Suspend
    }

    fn unload(&self, cx: &OpContext) -> Result<(), OperationError> {
        let (account_id, avatar_id) = (self.account_id, self.avatar_id);
        let conn = Channel::account(account_id);
        let fabric = cx.fabric();

        cx.post(FabricCommand::Presence(PresenceEvent::GoingOffline { avatar_id }))?;
        fabric.clear_disconnect_cleanups(conn)?;
        fabric.close_channel(conn, Channel::puppet(avatar_id))?;
        fabric.set_identity(conn, Channel::identity(account_id, 0))?;
        cx.post(FabricCommand::RemoveSessionObject {
            connection: conn,
            object: avatar_id,
        })?;
        cx.post(FabricCommand::DeleteObject { object: avatar_id })?;

        audit!("avatarUnload", avatar_id, account_id);
        Ok(())
    }
}
