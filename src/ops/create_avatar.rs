//! CreateAvatar: create an avatar record and claim a slot for it.

use super::{CallReply, OpContext, Step, expect_account};
use crate::dna::AvatarDna;
use crate::error::OperationError;
use crate::ids::ObjectId;
use crate::protocol::ClientResponse;
use crate::records::{AVATAR_SLOTS, AvatarRecord, AvatarSlots, Field, Record, RecordType};
use crate::telemetry::audit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    RetrieveAccount,
    CreateAvatar,
    StoreAvatar,
}

#[derive(Debug)]
pub struct CreateAvatar {
    account_id: ObjectId,
    raw_dna: Vec<u8>,
    slot: usize,
    state: State,
    dna: Option<AvatarDna>,
    /// Slot table as read; the expected value of the final update.
    slots: AvatarSlots,
    avatar_id: ObjectId,
}

impl CreateAvatar {
    pub fn new(account_id: ObjectId, dna: Vec<u8>, slot: u8) -> Self {
        Self {
            account_id,
            raw_dna: dna,
            slot: slot as usize,
            state: State::Start,
            dna: None,
            slots: [0; AVATAR_SLOTS],
            avatar_id: 0,
        }
    }

    pub fn account_id(&self) -> ObjectId {
        self.account_id
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            State::Start => "Start",
            State::RetrieveAccount => "RetrieveAccount",
            State::CreateAvatar => "CreateAvatar",
            State::StoreAvatar => "StoreAvatar",
        }
    }

    fn demand(&mut self, state: State) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            State::Start => {
                if self.slot >= AVATAR_SLOTS {
                    return Step::Kill(OperationError::Validation(
                        "Invalid index specified!".to_string(),
                    ));
                }
                match AvatarDna::parse(&self.raw_dna) {
                    Ok(dna) => self.dna = Some(dna),
                    Err(_) => {
                        return Step::Kill(OperationError::Validation(
                            "Invalid DNA specified!".to_string(),
                        ));
                    }
                }
                self.demand(State::RetrieveAccount)
            }
            State::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            State::CreateAvatar => {
                let Some(dna) = self.dna.clone() else {
                    return Step::Kill(OperationError::Validation(
                        "Invalid DNA specified!".to_string(),
                    ));
                };
                cx.create(Record::Avatar(AvatarRecord::new(self.account_id, dna)));
                Step::Suspend
            }
            State::StoreAvatar => {
                let mut slots = self.slots;
                slots[self.slot] = self.avatar_id;
                cx.update(
                    self.account_id,
                    RecordType::Account,
                    vec![Field::AvatarSlots(slots)],
                    vec![Field::AvatarSlots(self.slots)],
                );
                Step::Suspend
            }
        }
    }

    pub(crate) fn resume(&mut self, cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (State::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                let account = match expect_account(result) {
                    Ok(account) => account,
                    Err(err) => return Step::Kill(err),
                };
                self.slots = account.avatar_slots;
                if self.slots[self.slot] != 0 {
                    return Step::Kill(OperationError::Integrity(
                        "This avatar slot is already taken by another avatar!".to_string(),
                    ));
                }
                self.demand(State::CreateAvatar)
            }
            (State::CreateAvatar, CallReply::Created(result)) => match result {
                Ok(avatar_id) => {
                    self.avatar_id = avatar_id;
                    self.demand(State::StoreAvatar)
                }
                Err(e) => Step::Kill(OperationError::from_store(
                    &e,
                    "Database failed to create the new avatar object!",
                )),
            },
            (State::StoreAvatar, CallReply::Updated(result)) => {
                if let Err(e) = result {
                    return Step::Kill(OperationError::from_store(
                        &e,
                        "Database failed to associate the new avatar to your account!",
                    ));
                }
                let dna_hex = self.dna.as_ref().map(AvatarDna::to_hex).unwrap_or_default();
                audit!(
                    "avatarCreated",
                    avatar_id = self.avatar_id,
                    account_id = self.account_id,
                    dna = %dna_hex,
                    slot = self.slot
                );
                match cx.reply(ClientResponse::CreateAvatarResult {
                    avatar_id: self.avatar_id,
                }) {
                    Ok(()) => Step::Off,
                    Err(err) => Step::Kill(err),
                }
            }
            _ => Step::Suspend,
        }
    }
}
