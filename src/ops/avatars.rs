//! GetAvatars and DeleteAvatar.
//!
//! Both end by sending the account's avatar list; a delete first clears the
//! slot and logs the deletion, then falls through to the same listing.

use super::{CallReply, OpContext, Step, expect_account, expect_avatar};
use crate::error::OperationError;
use crate::ids::ObjectId;
use crate::protocol::{AvatarSummary, ClientResponse};
use crate::records::{AccountRecord, AvatarRecord, Field, RecordType, WishNameState};
use crate::telemetry::audit;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    RetrieveAccount,
    ProcessDelete,
    QueryAvatars,
    SendAvatars,
}

#[derive(Debug)]
pub struct ListAvatars {
    account_id: ObjectId,
    /// Avatar to delete before listing.
    delete: Option<ObjectId>,
    state: State,
    account: Option<AccountRecord>,
    /// Avatars still awaiting a fetch or a moderation verdict.
    pending: HashSet<ObjectId>,
    avatars: HashMap<ObjectId, AvatarRecord>,
}

impl ListAvatars {
    /// GetAvatars.
    pub fn get(account_id: ObjectId) -> Self {
        Self {
            account_id,
            delete: None,
            state: State::Start,
            account: None,
            pending: HashSet::new(),
            avatars: HashMap::new(),
        }
    }

    /// DeleteAvatar.
    pub fn delete(account_id: ObjectId, avatar_id: ObjectId) -> Self {
        Self {
            delete: Some(avatar_id),
            ..Self::get(account_id)
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub fn is_delete(&self) -> bool {
        self.delete.is_some()
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            State::Start => "Start",
            State::RetrieveAccount => "RetrieveAccount",
            State::ProcessDelete => "ProcessDelete",
            State::QueryAvatars => "QueryAvatars",
            State::SendAvatars => "SendAvatars",
        }
    }

    fn demand(&mut self, state: State) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            State::Start => self.demand(State::RetrieveAccount),
            State::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            State::ProcessDelete => self.process_delete(cx),
            State::QueryAvatars => {
                let Some(account) = self.account.clone() else {
                    return self.demand(State::RetrieveAccount);
                };
                self.avatars.clear();
                self.pending = account.occupied().map(|(_, id)| id).collect();
                if self.pending.is_empty() {
                    return self.demand(State::SendAvatars);
                }
                // Fan out: every fetch is in flight at once.
                for (_, avatar_id) in account.occupied() {
                    cx.fetch(avatar_id);
                }
                Step::Suspend
            }
            State::SendAvatars => match cx.reply(ClientResponse::AvatarList {
                avatars: self.summaries(),
            }) {
                Ok(()) => Step::Off,
                Err(err) => Step::Kill(err),
            },
        }
    }

    pub(crate) fn resume(&mut self, cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (State::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                match expect_account(result) {
                    Ok(account) => {
                        self.account = Some(account);
                        if self.delete.is_some() {
                            self.demand(State::ProcessDelete)
                        } else {
                            self.demand(State::QueryAvatars)
                        }
                    }
                    Err(err) => Step::Kill(err),
                }
            }
            (State::ProcessDelete, CallReply::Updated(result)) => {
                if let Err(e) = result {
                    return Step::Kill(OperationError::from_store(
                        &e,
                        "Database failed to mark the avatar as deleted!",
                    ));
                }
                if let Some(avatar_id) = self.delete {
                    audit!("avatarDeleted", avatar_id, account_id = self.account_id);
                }
                self.demand(State::QueryAvatars)
            }
            (State::QueryAvatars, CallReply::Fetched { id, result }) => {
                if !self.pending.contains(&id) || self.avatars.contains_key(&id) {
                    return Step::Suspend;
                }
                let avatar = match expect_avatar(result) {
                    Ok(avatar) => avatar,
                    Err(err) => return Step::Kill(err),
                };
                let awaiting_verdict = avatar.wish_name_state == WishNameState::Pending;
                self.avatars.insert(id, avatar);
                if awaiting_verdict {
                    cx.reconcile_name(id);
                } else {
                    self.pending.remove(&id);
                }
                self.advance_if_done()
            }
            (State::QueryAvatars, CallReply::NameVerdict { id, result }) => {
                if !self.pending.remove(&id) {
                    return Step::Suspend;
                }
                match result {
                    Ok(Some(verdict @ (WishNameState::Approved | WishNameState::Rejected))) => {
                        if let Some(avatar) = self.avatars.get_mut(&id)
                            && let Err(e) = avatar.apply_verdict(verdict)
                        {
                            warn!(avatar_id = id, error = %e, "Ignoring moderation verdict");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(avatar_id = id, error = %e, "Moderation lookup failed, reporting pending");
                    }
                }
                self.advance_if_done()
            }
            _ => Step::Suspend,
        }
    }

    fn advance_if_done(&mut self) -> Step {
        if self.pending.is_empty() {
            self.demand(State::SendAvatars)
        } else {
            Step::Suspend
        }
    }

    /// Clear the slot, log the deletion and release the estate slot.
    fn process_delete(&mut self, cx: &mut OpContext) -> Step {
        let (Some(avatar_id), Some(account)) = (self.delete, self.account.as_mut()) else {
            return Step::Kill(OperationError::Integrity(
                "Tried to delete an avatar not in the account!".to_string(),
            ));
        };
        let Some(slot) = account.slot_of(avatar_id) else {
            return Step::Kill(OperationError::Integrity(
                "Tried to delete an avatar not in the account!".to_string(),
            ));
        };

        let old_slots = account.avatar_slots;
        let old_log = account.deleted_avatars.clone();
        account.avatar_slots[slot] = 0;
        account
            .deleted_avatars
            .push(avatar_id, Utc::now().timestamp());

        if let Some(estate_id) = account.estate() {
            cx.update_detached(
                estate_id,
                RecordType::Estate,
                vec![Field::EstateSlot {
                    index: slot,
                    avatar_id: 0,
                    items: Vec::new(),
                }],
            );
        }

        cx.update(
            self.account_id,
            RecordType::Account,
            vec![
                Field::AvatarSlots(account.avatar_slots),
                Field::DeletedAvatars(account.deleted_avatars.clone()),
            ],
            vec![Field::AvatarSlots(old_slots), Field::DeletedAvatars(old_log)],
        );
        cx.remove_name_request(avatar_id);
        Step::Suspend
    }

    /// Avatar list in slot order.
    fn summaries(&self) -> Vec<AvatarSummary> {
        let Some(account) = &self.account else {
            return Vec::new();
        };
        account
            .occupied()
            .filter_map(|(slot, id)| {
                let avatar = self.avatars.get(&id)?;
                let name = if avatar.wish_name_state == WishNameState::Approved {
                    avatar.wish_name.clone()
                } else {
                    avatar.display_name.clone()
                };
                Some(AvatarSummary {
                    avatar_id: id,
                    name,
                    dna: avatar.dna.as_bytes().to_vec(),
                    slot: slot as u8,
                    name_state: avatar.wish_name_state.name_state(),
                })
            })
            .collect()
    }
}
