//! CreateAvatar and DeleteAvatar against the account's slot table.

mod common;

use async_trait::async_trait;
use avatar_sessions::config::LoginConfig;
use avatar_sessions::fabric::{ChannelFabric, EJECT_KILLED};
use avatar_sessions::ids::ObjectId;
use avatar_sessions::namedb::AccountNameDb;
use avatar_sessions::naming::{NameDictionary, NameJudge};
use avatar_sessions::ops::{CreateAvatar, Operation, Services, engine};
use avatar_sessions::protocol::{ClientRequest, ClientResponse};
use avatar_sessions::records::{
    AccountRecord, DELETION_LOG_CAPACITY, EstateRecord, Field, Record, RecordType, WishNameState,
};
use avatar_sessions::sessions::SessionTable;
use avatar_sessions::store::{MemoryRecordStore, RecordStore, StoreError};
use avatar_sessions::{OperationError, Outcome};
use common::{TestClient, TestServer, eventually, sample_dna};
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test]
async fn create_fills_requested_slot() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    let account_id = client.login("alice").await;
    client.responses();

    let a = client.create_avatar(3).await;
    let b = client.create_avatar(0).await;
    let slots = server.account(account_id).avatar_slots;
    assert_eq!(slots, [b, 0, 0, a, 0, 0]);

    let avatar = server.avatar(a);
    assert_eq!(avatar.account_id, account_id);
    assert_eq!(avatar.wish_name_state, WishNameState::Open);
    assert_eq!(avatar.display_name, "Peach Dog");

    // Listing follows slot order, not creation order.
    let listed: Vec<_> = client.avatars().await.iter().map(|s| (s.slot, s.avatar_id)).collect();
    assert_eq!(listed, vec![(0, b), (3, a)]);
}

#[tokio::test]
async fn create_rejects_bad_input() {
    for (dna, slot, reason) in [
        (sample_dna(), 6, "Invalid index specified!"),
        (vec![b't', 0], 0, "Invalid DNA specified!"),
    ] {
        let server = TestServer::start();
        let client = TestClient::connect(&server);
        let account_id = client.login("alice").await;

        let outcome = client.request(ClientRequest::CreateAvatar { dna, slot }).await;
        assert_eq!(
            outcome,
            Outcome::Killed(OperationError::Validation(reason.into()))
        );
        assert_eq!(client.ejection(), Some((EJECT_KILLED, reason.into())));
        assert_eq!(server.account(account_id).avatar_slots, [0; 6]);
    }
}

#[tokio::test]
async fn create_into_taken_slot_is_killed() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    let account_id = client.login("alice").await;
    let first = client.create_avatar(1).await;

    let outcome = client
        .request(ClientRequest::CreateAvatar {
            dna: sample_dna(),
            slot: 1,
        })
        .await;
    assert_eq!(
        outcome,
        Outcome::Killed(OperationError::Integrity(
            "This avatar slot is already taken by another avatar!".into()
        ))
    );
    assert_eq!(server.account(account_id).avatar_slots[1], first);
}

#[tokio::test]
async fn delete_clears_slot_logs_and_relists() {
    let server = TestServer::start();
    let account_id = 900;
    let estate_id = 901;
    let mut account = AccountRecord::new("alice", 1);
    account.estate_id = estate_id;
    server.store.insert(account_id, Record::Account(account));
    let mut estate = EstateRecord::new();
    estate.slot_items[0] = vec![1, 2, 3];
    server.store.insert(estate_id, Record::Estate(estate));
    server.namedb.store_account_id("alice", account_id).unwrap();

    let client = TestClient::connect(&server);
    client.login("alice").await;
    let doomed = client.create_avatar(0).await;
    let kept = client.create_avatar(1).await;
    assert!(client.name_typed(doomed, "Soon Gone").await);
    client.responses();

    let outcome = client
        .request(ClientRequest::DeleteAvatar { avatar_id: doomed })
        .await;
    assert_eq!(outcome, Outcome::Completed);

    // The client's view is re-synchronized with the remaining avatar.
    match client.response() {
        ClientResponse::AvatarList { avatars } => {
            assert_eq!(avatars.len(), 1);
            assert_eq!(avatars[0].avatar_id, kept);
        }
        other => panic!("expected avatarList, got {other:?}"),
    }

    let account = server.account(account_id);
    assert_eq!(account.avatar_slots, [0, kept, 0, 0, 0, 0]);
    assert!(!account.owns(doomed));
    assert_eq!(account.deleted_avatars.len(), 1);
    assert!(account.deleted_avatars.contains(doomed));

    let store = server.store.clone();
    eventually(|| match store.get(estate_id) {
        Some(Record::Estate(e)) => e.slot_items[0].is_empty() && e.slot_avatars[0] == 0,
        _ => false,
    })
    .await;
    let namedb = server.namedb.clone();
    eventually(|| namedb.name_request(doomed).unwrap().is_none()).await;
}

#[tokio::test]
async fn delete_of_foreign_avatar_is_killed() {
    let server = TestServer::start();
    let owner = TestClient::connect(&server);
    let intruder = TestClient::connect(&server);
    owner.login("alice").await;
    let intruder_account = intruder.login("mallory").await;
    let target = owner.create_avatar(0).await;

    let outcome = intruder
        .request(ClientRequest::DeleteAvatar { avatar_id: target })
        .await;
    assert_eq!(
        outcome,
        Outcome::Killed(OperationError::Integrity(
            "Tried to delete an avatar not in the account!".into()
        ))
    );
    assert!(intruder.ejection().is_some());
    assert!(server.avatar(target).account_id != intruder_account);
    assert_eq!(server.account(server.avatar(target).account_id).avatar_slots[0], target);
}

#[tokio::test]
async fn deletion_log_keeps_newest_entries() {
    let server = TestServer::start();
    let client = TestClient::connect(&server);
    let account_id = client.login("alice").await;

    let mut deleted = Vec::new();
    for _ in 0..DELETION_LOG_CAPACITY + 5 {
        let avatar_id = client.create_avatar(0).await;
        let outcome = client
            .request(ClientRequest::DeleteAvatar { avatar_id })
            .await;
        assert_eq!(outcome, Outcome::Completed);
        client.responses();
        deleted.push(avatar_id);
    }

    let log = server.account(account_id).deleted_avatars;
    assert_eq!(log.len(), DELETION_LOG_CAPACITY);
    for evicted in &deleted[..5] {
        assert!(!log.contains(*evicted));
    }
    for kept in &deleted[5..] {
        assert!(log.contains(*kept));
    }
}

/// Store that holds every account update until two have arrived, so both
/// writers have read the same slot table before either writes.
struct BarrierStore {
    inner: MemoryRecordStore,
    barrier: Barrier,
}

#[async_trait]
impl RecordStore for BarrierStore {
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
        if kind == RecordType::Account {
            self.barrier.wait().await;
        }
        self.inner.update(id, kind, changes, expected).await
    }
}

#[tokio::test]
async fn concurrent_creates_into_one_slot_conflict() {
    let account_id = 700;
    let inner = MemoryRecordStore::new();
    inner.insert(account_id, Record::Account(AccountRecord::new("alice", 1)));
    let store = Arc::new(BarrierStore {
        inner,
        barrier: Barrier::new(2),
    });
    let (fabric, _commands) = ChannelFabric::new();
    let services = Arc::new(Services {
        store: store.clone(),
        fabric: Arc::new(fabric),
        namedb: AccountNameDb::in_memory().unwrap(),
        judge: NameJudge::default(),
        dictionary: NameDictionary::builtin(),
        login: LoginConfig::default(),
        sessions: SessionTable::new(),
        reply_timeout: None,
    });

    // Mailbox senders are held until both finish; dropping one abandons its op.
    let spawn = || {
        let op = Operation::CreateAvatar(CreateAvatar::new(account_id, sample_dna(), 2));
        engine::spawn(Arc::clone(&services), op, Box::new(|| {}))
    };
    let ((a, _a_mailbox), (b, _b_mailbox)) = (spawn(), spawn());
    let outcomes = [a.await.unwrap(), b.await.unwrap()];

    let completed = outcomes.iter().filter(|o| **o == Outcome::Completed).count();
    assert_eq!(completed, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.iter().any(|o| *o
        == Outcome::Killed(OperationError::StoreConflict(
            "Database failed to associate the new avatar to your account!".into()
        ))));

    let slots = match store.inner.get(account_id) {
        Some(Record::Account(account)) => account.avatar_slots,
        other => panic!("expected account, got {other:?}"),
    };
    assert_ne!(slots[2], 0);
}
