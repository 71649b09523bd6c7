//! LoginAccount: bind a raw connection to its account.

use super::{CallReply, OpContext, Step, expect_account};
use crate::error::OperationError;
use crate::fabric::{ClientState, EJECT_REDUNDANT_LOGIN, FabricCommand};
use crate::ids::{Channel, ObjectId};
use crate::protocol::{ClientResponse, LoginResponse};
use crate::records::{AccountRecord, Field, Record, RecordType};
use crate::telemetry::audit;
use chrono::{Local, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    QueryAccountDb,
    CreateAccount,
    StoreAccountId,
    RetrieveAccount,
    SetAccount,
}

#[derive(Debug)]
pub struct LoginAccount {
    connection: Channel,
    token: String,
    state: State,
    account_id: ObjectId,
    account: Option<AccountRecord>,
}

impl LoginAccount {
    pub fn new(connection: Channel, token: String) -> Self {
        Self {
            connection,
            token,
            state: State::Start,
            account_id: 0,
            account: None,
        }
    }

    pub fn connection(&self) -> Channel {
        self.connection
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self.state {
            State::Start => "Start",
            State::QueryAccountDb => "QueryAccountDb",
            State::CreateAccount => "CreateAccount",
            State::StoreAccountId => "StoreAccountId",
            State::RetrieveAccount => "RetrieveAccount",
            State::SetAccount => "SetAccount",
        }
    }

    fn demand(&mut self, state: State) -> Step {
        self.state = state;
        Step::Enter
    }

    pub(crate) fn enter(&mut self, cx: &mut OpContext) -> Step {
        match self.state {
            State::Start => self.demand(State::QueryAccountDb),
            State::QueryAccountDb => {
                cx.lookup_login(self.token.clone());
                Step::Suspend
            }
            State::CreateAccount => {
                let account = AccountRecord::new(self.token.clone(), Utc::now().timestamp());
                cx.create(Record::Account(account.clone()));
                self.account = Some(account);
                Step::Suspend
            }
            State::StoreAccountId => {
                cx.store_login(self.token.clone(), self.account_id);
                Step::Suspend
            }
            State::RetrieveAccount => {
                cx.fetch(self.account_id);
                Step::Suspend
            }
            State::SetAccount => match self.set_account(cx) {
                Ok(()) => Step::Off,
                Err(err) => Step::Kill(err),
            },
        }
    }

    pub(crate) fn resume(&mut self, _cx: &mut OpContext, reply: CallReply) -> Step {
        match (self.state, reply) {
            (State::QueryAccountDb, CallReply::LoginLookup(result)) => match result {
                Ok(Some(account_id)) => {
                    self.account_id = account_id;
                    self.demand(State::RetrieveAccount)
                }
                Ok(None) => self.demand(State::CreateAccount),
                Err(e) => {
                    audit!("tokenRejected", connection = %self.connection, login = %self.token, error = %e);
                    Step::Kill(OperationError::StoreFailure(
                        "The account server rejected your token.".to_string(),
                    ))
                }
            },
            (State::CreateAccount, CallReply::Created(result)) => match result {
                Ok(account_id) => {
                    self.account_id = account_id;
                    audit!("accountCreated", account_id);
                    self.demand(State::StoreAccountId)
                }
                Err(e) => Step::Kill(OperationError::from_store(
                    &e,
                    "Your account object could not be created in the game database.",
                )),
            },
            (State::StoreAccountId, CallReply::LoginStored(result)) => match result {
                Ok(()) => self.demand(State::SetAccount),
                Err(_) => Step::Kill(OperationError::StoreFailure(
                    "The account server could not save your user ID!".to_string(),
                )),
            },
            (State::RetrieveAccount, CallReply::Fetched { result, .. }) => {
                match expect_account(result) {
                    Ok(account) => {
                        self.account = Some(account);
                        self.demand(State::SetAccount)
                    }
                    Err(err) => Step::Kill(err),
                }
            }
            _ => Step::Suspend,
        }
    }

    /// Hand the connection over to the account, in order.
    fn set_account(&mut self, cx: &mut OpContext) -> Result<(), OperationError> {
        let account_id = self.account_id;
        let account_channel = Channel::account(account_id);
        let conn = self.connection;

        // Single session per account: whoever holds the channel now goes.
        cx.fabric().eject(
            account_channel,
            EJECT_REDUNDANT_LOGIN,
            "This account has been logged in from elsewhere.",
        )?;
        cx.fabric().open_channel(conn, account_channel)?;
        cx.fabric()
            .set_identity(conn, Channel::identity(account_id, 0))?;
        cx.services().sessions.bind(account_id, conn);
        cx.post(FabricCommand::SetClientState {
            connection: conn,
            state: ClientState::Established,
        })?;

        let now = Utc::now().timestamp();
        cx.update_detached(
            account_id,
            RecordType::Account,
            vec![Field::LastLogin(now), Field::LoginId(self.token.clone())],
        );

        let login = &cx.services().login;
        let response = LoginResponse {
            return_code: 0,
            resp_string: String::new(),
            account_number: conn.0,
            create_friends_with_chat: login.create_friends_with_chat.clone(),
            chat_code_creation_rule: login.chat_code_creation_rule.clone(),
            access: login.access.clone(),
            white_list_response: login.whitelist_chat.clone(),
            last_logged_in: Local::now().format("%Y-%m-%d %I:%M:%S").to_string(),
            account_days: self
                .account
                .as_ref()
                .and_then(|a| a.days_since_creation(now))
                .unwrap_or(-1),
            server_time: now,
            toon_account_type: "NO_PARENT_ACCOUNT".to_string(),
            user_name: self.token.clone(),
        };
        let payload = serde_json::to_string(&response)
            .map_err(|e| OperationError::RouterFailure(e.to_string()))?;

        audit!("accountLogin", connection = %conn, account_id, login = %self.token);
        cx.fabric().send(
            conn,
            ClientResponse::LoginAccepted {
                server_time: now,
                payload,
            },
        )?;
        Ok(())
    }
}
