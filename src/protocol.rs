//! Client-facing request and response messages.
//!
//! Field layout only; byte-level framing belongs to the transport. The stdio
//! bridge in `sessiond` carries these as JSON.

use crate::ids::{Channel, ObjectId};
use crate::records::{NameState, WishNameState};
use serde::{Deserialize, Serialize};

/// One part of a pattern name: a dictionary index plus capitalization flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePart {
    /// Dictionary id; negative or unknown ids render as an empty part.
    pub index: i16,
    #[serde(default)]
    pub capitalize: bool,
}

impl NamePart {
    pub fn new(index: i16, capitalize: bool) -> Self {
        Self { index, capitalize }
    }

    /// An unused part.
    pub fn empty() -> Self {
        Self {
            index: -1,
            capitalize: false,
        }
    }
}

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Login {
        token: String,
        /// Hex HMAC-SHA256 of the token under the server's login secret.
        digest: String,
    },
    RequestAvatars,
    CreateAvatar {
        dna: Vec<u8>,
        slot: u8,
    },
    DeleteAvatar {
        avatar_id: ObjectId,
    },
    SetNameTyped {
        avatar_id: ObjectId,
        name: String,
    },
    SetNamePattern {
        avatar_id: ObjectId,
        parts: [NamePart; 4],
    },
    AcknowledgeAvatarName {
        avatar_id: ObjectId,
    },
    /// `0` deactivates the current avatar.
    ChooseAvatar {
        avatar_id: ObjectId,
    },
}

impl ClientRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::RequestAvatars => "requestAvatars",
            Self::CreateAvatar { .. } => "createAvatar",
            Self::DeleteAvatar { .. } => "deleteAvatar",
            Self::SetNameTyped { .. } => "setNameTyped",
            Self::SetNamePattern { .. } => "setNamePattern",
            Self::AcknowledgeAvatarName { .. } => "acknowledgeAvatarName",
            Self::ChooseAvatar { .. } => "chooseAvatar",
        }
    }
}

/// One entry of the avatar list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarSummary {
    pub avatar_id: ObjectId,
    pub name: String,
    pub dna: Vec<u8>,
    pub slot: u8,
    pub name_state: NameState,
}

/// Responses delivered to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientResponse {
    LoginAccepted {
        server_time: i64,
        /// JSON-encoded [`LoginResponse`].
        payload: String,
    },
    AvatarList {
        avatars: Vec<AvatarSummary>,
    },
    CreateAvatarResult {
        avatar_id: ObjectId,
    },
    NameTypedResult {
        avatar_id: ObjectId,
        accepted: bool,
    },
    NamePatternResult {
        avatar_id: ObjectId,
        accepted: bool,
    },
    NameAcknowledged,
    /// Days since account creation, sent on avatar activation.
    AccountDays {
        days: i64,
    },
}

/// Login response body, keyed the way game clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "returnCode")]
    pub return_code: i32,
    #[serde(rename = "respString")]
    pub resp_string: String,
    #[serde(rename = "accountNumber")]
    pub account_number: u64,
    #[serde(rename = "createFriendsWithChat")]
    pub create_friends_with_chat: String,
    #[serde(rename = "chatCodeCreationRule")]
    pub chat_code_creation_rule: String,
    pub access: String,
    #[serde(rename = "WhiteListResponse")]
    pub white_list_response: String,
    #[serde(rename = "lastLoggedInStr")]
    pub last_logged_in: String,
    /// `-1` when the creation date is unknown.
    #[serde(rename = "accountDays")]
    pub account_days: i64,
    #[serde(rename = "serverTime")]
    pub server_time: i64,
    #[serde(rename = "toonAccountType")]
    pub toon_account_type: String,
    #[serde(rename = "userName")]
    pub user_name: String,
}

/// Messages accepted by the dispatcher's front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    Request {
        sender: Channel,
        request: ClientRequest,
    },
    /// The fabric dropped a raw connection.
    Disconnect {
        connection: Channel,
    },
    /// Operator moderation verdict on a pending name.
    SetNameStatus {
        avatar_id: ObjectId,
        status: WishNameState,
    },
}
