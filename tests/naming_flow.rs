//! Typed names, pattern names and moderation acknowledgement.

mod common;

use async_trait::async_trait;
use avatar_sessions::ids::ObjectId;
use avatar_sessions::naming::NameJudge;
use avatar_sessions::protocol::{ClientRequest, ClientResponse, NamePart};
use avatar_sessions::records::{Field, NameState, Record, RecordType, WishNameState};
use avatar_sessions::store::{RecordStore, StoreError};
use avatar_sessions::{OperationError, Outcome};
use common::{TestClient, TestServer, eventually};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn not_namable() -> Outcome {
    Outcome::Killed(OperationError::Integrity(
        "Avatar is not in a namable state!".into(),
    ))
}

#[tokio::test]
async fn typed_name_twice_is_killed() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;

    assert!(client.name_typed(avatar_id, "First Try").await);
    let outcome = client
        .request(ClientRequest::SetNameTyped {
            avatar_id,
            name: "Second Try".into(),
        })
        .await;
    assert_eq!(outcome, not_namable());
    assert_eq!(server.avatar(avatar_id).wish_name, "First Try");
}

#[tokio::test]
async fn approved_avatar_cannot_be_renamed() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;
    assert!(client.name_typed(avatar_id, "Good Name").await);
    server
        .dispatcher
        .set_name_status(avatar_id, WishNameState::Approved)
        .unwrap();
    client.avatars().await;

    let outcome = client
        .request(ClientRequest::SetNameTyped {
            avatar_id,
            name: "Other Name".into(),
        })
        .await;
    assert_eq!(outcome, not_namable());
}

#[tokio::test]
async fn rejected_name_reopens_after_acknowledge() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;
    assert!(client.name_typed(avatar_id, "Rude Name").await);
    server
        .dispatcher
        .set_name_status(avatar_id, WishNameState::Rejected)
        .unwrap();

    let avatars = client.avatars().await;
    assert_eq!(avatars[0].name_state, NameState::Rejected);
    assert_eq!(avatars[0].name, "Peach Dog");

    let outcome = client
        .request(ClientRequest::AcknowledgeAvatarName { avatar_id })
        .await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(client.response(), ClientResponse::NameAcknowledged);
    let avatar = server.avatar(avatar_id);
    assert_eq!(avatar.wish_name_state, WishNameState::Open);
    assert!(avatar.wish_name.is_empty());
    assert_eq!(avatar.display_name, "Peach Dog");

    // The slot is open again.
    assert!(client.name_typed(avatar_id, "Polite Name").await);
}

#[tokio::test]
async fn acknowledge_while_pending_is_killed() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;
    assert!(client.name_typed(avatar_id, "Waiting Name").await);

    let outcome = client
        .request(ClientRequest::AcknowledgeAvatarName { avatar_id })
        .await;
    assert_eq!(
        outcome,
        Outcome::Killed(OperationError::Integrity(
            "Tried to acknowledge name on an avatar in PENDING state!".into()
        ))
    );
}

#[tokio::test]
async fn banned_and_empty_names_are_refused() {
    let server = TestServer::start_with(|params| {
        params.judge = NameJudge::new(&["grump"]);
    });
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;

    assert!(!client.name_typed(avatar_id, "Sir Grumpalot").await);
    assert!(!client.name_typed(avatar_id, "").await);
    assert_eq!(server.avatar(avatar_id).wish_name_state, WishNameState::Open);
    assert!(server.namedb.name_request(avatar_id).unwrap().is_none());

    assert!(client.name_typed(avatar_id, "Sir Happy").await);
}

#[tokio::test]
async fn typed_name_without_avatar_only_judges() {
    let server = TestServer::start_with(|params| {
        params.judge = NameJudge::new(&["grump"]);
    });
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let records = server.store.len();

    assert!(client.name_typed(0, "Any Name").await);
    assert!(!client.name_typed(0, "Grumpy").await);
    assert_eq!(server.store.len(), records);
}

#[tokio::test]
async fn naming_foreign_avatar_is_killed() {
    let server = TestServer::start();
    let owner = TestClient::connect(&server);
    let intruder = TestClient::connect(&server);
    owner.login("alice").await;
    intruder.login("mallory").await;
    let avatar_id = owner.create_avatar(0).await;

    let outcome = intruder
        .request(ClientRequest::SetNameTyped {
            avatar_id,
            name: "Stolen".into(),
        })
        .await;
    assert_eq!(
        outcome,
        Outcome::Killed(OperationError::Integrity(
            "Tried to name an avatar not in the account!".into()
        ))
    );
    assert_eq!(server.avatar(avatar_id).wish_name_state, WishNameState::Open);
}

#[tokio::test]
async fn auto_approve_shows_approved_on_next_listing() {
    let server = TestServer::start_with(|params| {
        params.namedb = params.namedb.clone().with_auto_approve(true);
    });
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;

    assert!(client.name_typed(avatar_id, "Quick Name").await);
    assert_eq!(server.avatar(avatar_id).wish_name_state, WishNameState::Pending);

    let avatars = client.avatars().await;
    assert_eq!(avatars[0].name_state, NameState::Approved);
    assert_eq!(avatars[0].name, "Quick Name");
}

#[tokio::test]
async fn pattern_name_applies_immediately() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;

    let parts = [
        NamePart::new(0, true),
        NamePart::new(20, false),
        NamePart::new(40, true),
        NamePart::new(60, false),
    ];
    let outcome = client
        .request(ClientRequest::SetNamePattern { avatar_id, parts })
        .await;
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        client.response(),
        ClientResponse::NamePatternResult {
            avatar_id,
            accepted: true
        }
    );

    let avatar = server.avatar(avatar_id);
    assert_eq!(avatar.display_name, "Mr true Fuzzywuzzy");
    assert_eq!(avatar.wish_name_state, WishNameState::Unset);

    // Named avatars are no longer namable.
    let again = client
        .request(ClientRequest::SetNamePattern { avatar_id, parts })
        .await;
    assert_eq!(again, not_namable());
}

#[tokio::test]
async fn empty_pattern_is_invalid() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;

    let outcome = client
        .request(ClientRequest::SetNamePattern {
            avatar_id,
            parts: [NamePart::empty(); 4],
        })
        .await;
    assert_eq!(
        outcome,
        Outcome::Killed(OperationError::Validation(
            "Invalid name pattern specified!".into()
        ))
    );
    assert_eq!(server.avatar(avatar_id).display_name, "Peach Dog");
}

/// Store that refuses avatar updates once broken.
struct BrokenAvatarWrites {
    inner: Arc<dyn RecordStore>,
    broken: AtomicBool,
}

#[async_trait]
impl RecordStore for BrokenAvatarWrites {
    async fn fetch(&self, id: ObjectId) -> Result<Record, StoreError> {
        self.inner.fetch(id).await
    }

    async fn create(&self, record: Record) -> Result<ObjectId, StoreError> {
        self.inner.create(record).await
    }

    async fn update(
        &self,
        id: ObjectId,
        kind: RecordType,
        changes: Vec<Field>,
        expected: Vec<Field>,
    ) -> Result<(), StoreError> {
        if kind == RecordType::Avatar && self.broken.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.update(id, kind, changes, expected).await
    }
}

#[tokio::test]
async fn failed_wish_write_withdraws_name_request() {
    let mut store = None;
    let server = TestServer::start_with(|params| {
        let wrapped = Arc::new(BrokenAvatarWrites {
            inner: Arc::clone(&params.store),
            broken: AtomicBool::new(false),
        });
        params.store = wrapped.clone();
        store = Some(wrapped);
    });
    let store = store.unwrap();
    let client = TestClient::connect(&server);
    client.login("alice").await;
    let avatar_id = client.create_avatar(0).await;

    store.broken.store(true, Ordering::SeqCst);
    let outcome = client
        .request(ClientRequest::SetNameTyped {
            avatar_id,
            name: "Never Stored".into(),
        })
        .await;
    assert_eq!(
        outcome,
        Outcome::Killed(OperationError::StoreFailure(
            "Database failed to record the requested name!".into()
        ))
    );

    let namedb = server.namedb.clone();
    eventually(|| namedb.name_request(avatar_id).unwrap().is_none()).await;
    assert_eq!(server.avatar(avatar_id).wish_name_state, WishNameState::Open);
}
