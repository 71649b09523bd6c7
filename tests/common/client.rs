//! Test client.
//!
//! One simulated connection on a [`TestServer`], with helpers for the common
//! request sequences.

use super::server::{TestServer, sample_dna};
use avatar_sessions::protocol::{AvatarSummary, ClientRequest, ClientResponse, LoginResponse};
use avatar_sessions::{Channel, Dispatch, ObjectId, Outcome};
use std::sync::Arc;

pub struct TestClient {
    server: Arc<TestServer>,
    pub conn: Channel,
}

impl TestClient {
    pub fn connect(server: &Arc<TestServer>) -> Self {
        Self {
            server: Arc::clone(server),
            conn: server.connect(),
        }
    }

    pub fn login_request(&self, token: &str) -> ClientRequest {
        ClientRequest::Login {
            token: token.to_string(),
            digest: self.server.dispatcher.login_digest(token),
        }
    }

    /// Log in as `token` and return the bound account id.
    pub async fn login(&self, token: &str) -> ObjectId {
        self.login_with_response(token).await.0
    }

    /// Log in as `token`; also returns the decoded login payload.
    pub async fn login_with_response(&self, token: &str) -> (ObjectId, LoginResponse) {
        let outcome = self.request(self.login_request(token)).await;
        assert_eq!(outcome, Outcome::Completed, "login failed");
        let account_id = self.identity().account_id();
        assert_ne!(account_id, 0, "identity not bound after login");
        match self.response() {
            ClientResponse::LoginAccepted { payload, .. } => {
                let body = serde_json::from_str(&payload).expect("login payload");
                (account_id, body)
            }
            other => panic!("expected loginAccepted, got {other:?}"),
        }
    }

    pub fn send(&self, request: ClientRequest) -> Dispatch {
        self.server.send(self.conn, request)
    }

    pub async fn request(&self, request: ClientRequest) -> Outcome {
        self.server.call(self.conn, request).await
    }

    pub fn identity(&self) -> Channel {
        self.server.identity(self.conn)
    }

    pub fn ejection(&self) -> Option<(u16, String)> {
        self.server.ejection(self.conn)
    }

    pub fn responses(&self) -> Vec<ClientResponse> {
        self.server.take_responses(self.conn)
    }

    /// The single response to the last request.
    pub fn response(&self) -> ClientResponse {
        let mut responses = self.responses();
        assert_eq!(responses.len(), 1, "expected one response, got {responses:?}");
        responses.remove(0)
    }

    pub async fn create_avatar(&self, slot: u8) -> ObjectId {
        let outcome = self
            .request(ClientRequest::CreateAvatar {
                dna: sample_dna(),
                slot,
            })
            .await;
        assert_eq!(outcome, Outcome::Completed, "createAvatar failed");
        match self.response() {
            ClientResponse::CreateAvatarResult { avatar_id } => avatar_id,
            other => panic!("expected createAvatarResult, got {other:?}"),
        }
    }

    pub async fn avatars(&self) -> Vec<AvatarSummary> {
        let outcome = self.request(ClientRequest::RequestAvatars).await;
        assert_eq!(outcome, Outcome::Completed, "requestAvatars failed");
        match self.response() {
            ClientResponse::AvatarList { avatars } => avatars,
            other => panic!("expected avatarList, got {other:?}"),
        }
    }

    pub async fn name_typed(&self, avatar_id: ObjectId, name: &str) -> bool {
        let outcome = self
            .request(ClientRequest::SetNameTyped {
                avatar_id,
                name: name.to_string(),
            })
            .await;
        assert_eq!(outcome, Outcome::Completed, "setNameTyped failed");
        match self.response() {
            ClientResponse::NameTypedResult {
                avatar_id: replied,
                accepted,
            } => {
                assert_eq!(replied, avatar_id);
                accepted
            }
            other => panic!("expected nameTypedResult, got {other:?}"),
        }
    }

    pub async fn choose(&self, avatar_id: ObjectId) -> Outcome {
        self.request(ClientRequest::ChooseAvatar { avatar_id }).await
    }
}
