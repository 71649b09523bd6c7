//! Session dispatcher.
//!
//! Routes client requests to lifecycle operations and owns the two guard
//! tables that keep at most one operation alive per connection (logins) and
//! per account (everything else). A request that arrives while its actor
//! already has an operation in flight is not queued: the actor is ejected.

use crate::config::{Config, LoginConfig};
use crate::error::OperationError;
use crate::fabric::{EJECT_KILLED, Fabric};
use crate::ids::{Channel, ObjectId};
use crate::metrics;
use crate::namedb::{AccountNameDb, NameDbError};
use crate::naming::{DictionaryError, NameDictionary, NameJudge};
use crate::ops::engine::{self, Release};
use crate::ops::{
    AcknowledgeName, CreateAvatar, ListAvatars, LoadAvatar, LoginAccount, OpEvent, Operation,
    OperationKind, Outcome, Services, SetNamePattern, SetNameTyped, UnloadAvatar,
};
use crate::protocol::ClientRequest;
use crate::records::WishNameState;
use crate::sessions::SessionTable;
use crate::store::RecordStore;
use crate::telemetry::{audit, spans};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("login secret cannot key HMAC-SHA256")]
    InvalidSecret,
}

/// Everything needed to build a [`SessionDispatcher`].
pub struct DispatcherParams {
    pub store: Arc<dyn RecordStore>,
    pub fabric: Arc<dyn Fabric>,
    pub namedb: AccountNameDb,
    pub judge: NameJudge,
    pub dictionary: NameDictionary,
    /// HMAC key for login digests.
    pub login_secret: String,
    pub login: LoginConfig,
    pub reply_timeout: Option<Duration>,
}

impl DispatcherParams {
    /// Params with no banned words, the built-in dictionary, default login
    /// flags and no reply deadline.
    pub fn new(
        store: Arc<dyn RecordStore>,
        fabric: Arc<dyn Fabric>,
        namedb: AccountNameDb,
        login_secret: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fabric,
            namedb,
            judge: NameJudge::default(),
            dictionary: NameDictionary::builtin(),
            login_secret: login_secret.into(),
            login: LoginConfig::default(),
            reply_timeout: None,
        }
    }

    /// Params from a loaded configuration. Reads the name dictionary file
    /// when one is configured.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn RecordStore>,
        fabric: Arc<dyn Fabric>,
        namedb: AccountNameDb,
    ) -> Result<Self, DictionaryError> {
        let dictionary = match &config.names.dictionary {
            Some(path) => NameDictionary::load(path)?,
            None => NameDictionary::builtin(),
        };
        Ok(Self {
            store,
            fabric,
            namedb,
            judge: NameJudge::new(&config.moderation.banned),
            dictionary,
            login_secret: config.server.login_secret.clone().unwrap_or_default(),
            login: config.login.clone(),
            reply_timeout: config.operations.reply_timeout(),
        })
    }
}

/// What the dispatcher did with a request.
#[derive(Debug)]
pub enum Dispatch {
    /// An operation was started; the handle resolves when it goes Off.
    Started(JoinHandle<Outcome>),
    /// The actor was ejected with this reason; no operation was started.
    Rejected(String),
    /// Nothing to do.
    Ignored,
}

/// Guard-table entry for one live operation.
struct InFlight {
    id: u64,
    kind: OperationKind,
    events: mpsc::UnboundedSender<OpEvent>,
}

/// Explicitly constructed dispatcher context, shared as `Arc<SessionDispatcher>`.
pub struct SessionDispatcher {
    services: Arc<Services>,
    login_mac: HmacSha256,
    /// Logins in flight, keyed by connection channel.
    connections: Arc<DashMap<Channel, InFlight>>,
    /// Account operations in flight, keyed by account id.
    accounts: Arc<DashMap<ObjectId, InFlight>>,
    next_op: AtomicU64,
}

impl SessionDispatcher {
    pub fn new(params: DispatcherParams) -> Result<Arc<Self>, DispatcherError> {
        let login_mac = HmacSha256::new_from_slice(params.login_secret.as_bytes())
            .map_err(|_| DispatcherError::InvalidSecret)?;
        metrics::init();

        let services = Services {
            store: params.store,
            fabric: params.fabric,
            namedb: params.namedb,
            judge: params.judge,
            dictionary: params.dictionary,
            login: params.login,
            sessions: SessionTable::new(),
            reply_timeout: params.reply_timeout,
        };
        Ok(Arc::new(Self {
            services: Arc::new(services),
            login_mac,
            connections: Arc::new(DashMap::new()),
            accounts: Arc::new(DashMap::new()),
            next_op: AtomicU64::new(1),
        }))
    }

    /// Hex HMAC-SHA256 of `token` under the login secret.
    pub fn login_digest(&self, token: &str) -> String {
        let mut mac = self.login_mac.clone();
        mac.update(token.as_bytes());
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Route one client request from `sender` (the connection's current
    /// sender identity).
    pub fn handle(self: &Arc<Self>, sender: Channel, request: ClientRequest) -> Dispatch {
        let _span = spans::request(request.name(), sender).entered();
        debug!("Dispatching request");

        match request {
            ClientRequest::Login { token, digest } => self.login(sender, token, &digest),
            other => self.run_account(sender, other),
        }
    }

    fn login(self: &Arc<Self>, sender: Channel, token: String, digest: &str) -> Dispatch {
        if sender.is_authenticated() {
            return self.reject(sender, "already_logged_in", "Client is already logged in.");
        }

        let expected = self.login_digest(&token);
        if !bool::from(expected.as_bytes().ct_eq(digest.as_bytes())) {
            audit!("tokenRejected", connection = %sender, login = %token);
            return self.reject(sender, "bad_token", "The account server rejected your token.");
        }

        let op = Operation::Login(LoginAccount::new(sender, token));
        self.start(&self.connections, sender, sender, op)
    }

    fn run_account(self: &Arc<Self>, sender: Channel, request: ClientRequest) -> Dispatch {
        let account_id = sender.account_id();
        if account_id == 0 {
            return self.reject(sender, "not_logged_in", "Client is not logged in.");
        }

        let op = match request {
            ClientRequest::RequestAvatars => Operation::ListAvatars(ListAvatars::get(account_id)),
            ClientRequest::CreateAvatar { dna, slot } => {
                Operation::CreateAvatar(CreateAvatar::new(account_id, dna, slot))
            }
            ClientRequest::DeleteAvatar { avatar_id } => {
                Operation::ListAvatars(ListAvatars::delete(account_id, avatar_id))
            }
            ClientRequest::SetNameTyped { avatar_id, name } => {
                Operation::SetNameTyped(SetNameTyped::new(account_id, avatar_id, name))
            }
            ClientRequest::SetNamePattern { avatar_id, parts } => {
                Operation::SetNamePattern(SetNamePattern::new(account_id, avatar_id, parts))
            }
            ClientRequest::AcknowledgeAvatarName { avatar_id } => {
                Operation::AcknowledgeName(AcknowledgeName::new(account_id, avatar_id))
            }
            ClientRequest::ChooseAvatar { avatar_id } => {
                let active = sender.avatar_id();
                match (avatar_id, active) {
                    (0, 0) => return Dispatch::Ignored,
                    (0, active) => Operation::UnloadAvatar(UnloadAvatar::new(account_id, active)),
                    (_, 0) => Operation::LoadAvatar(LoadAvatar::new(account_id, avatar_id)),
                    (_, _) => {
                        return self.reject(
                            Channel::account(account_id),
                            "avatar_active",
                            "An avatar is already chosen!",
                        );
                    }
                }
            }
            ClientRequest::Login { .. } => {
                return self.reject(sender, "already_logged_in", "Client is already logged in.");
            }
        };

        self.start(&self.accounts, account_id, Channel::account(account_id), op)
    }

    /// Insert the guard and spawn the operation, or eject `actor` when the
    /// key already has one in flight.
    fn start<K>(
        &self,
        table: &Arc<DashMap<K, InFlight>>,
        key: K,
        actor: Channel,
        op: Operation,
    ) -> Dispatch
    where
        K: Eq + Hash + Copy + Send + Sync + 'static,
    {
        match table.entry(key) {
            Entry::Occupied(entry) => {
                let reason = format!("An operation is already underway: {}", entry.get().kind);
                drop(entry);
                self.reject(actor, "duplicate", &reason)
            }
            Entry::Vacant(entry) => {
                let id = self.next_op.fetch_add(1, Ordering::Relaxed);
                let kind = op.kind();
                let release: Release = {
                    let table = Arc::clone(table);
                    Box::new(move || {
                        table.remove_if(&key, |_, live| live.id == id);
                    })
                };
                let (handle, events) = engine::spawn(Arc::clone(&self.services), op, release);
                entry.insert(InFlight { id, kind, events });
                info!(kind = %kind, actor = %actor, op = id, "Operation started");
                Dispatch::Started(handle)
            }
        }
    }

    fn reject(&self, target: Channel, label: &'static str, reason: &str) -> Dispatch {
        warn!(actor = %target, reason, "Rejecting request");
        metrics::record_rejected(label);
        if let Err(e) = self.services.fabric.eject(target, EJECT_KILLED, reason) {
            warn!(error = %e, "Failed to eject rejected actor");
        }
        Dispatch::Rejected(reason.to_string())
    }

    /// The raw `connection` went away: kill its login, and the operation of
    /// the account it holds. An account since taken over by another
    /// connection is left alone. Outstanding replies of killed operations
    /// are dropped.
    pub fn connection_lost(&self, connection: Channel) {
        let kill = |events: &mpsc::UnboundedSender<OpEvent>| {
            // A closed mailbox means the operation already went Off.
            let _ = events.send(OpEvent::Kill {
                error: OperationError::Disconnected,
            });
        };
        if let Some(live) = self.connections.get(&connection) {
            debug!(connection = %connection, kind = %live.kind, "Killing login on disconnect");
            kill(&live.events);
        }
        let Some(account_id) = self.services.sessions.unbind(connection) else {
            return;
        };
        if let Some(live) = self.accounts.get(&account_id) {
            debug!(account_id, kind = %live.kind, "Killing account operation on disconnect");
            kill(&live.events);
        }
    }

    /// Record a moderation verdict for a pending name request. Blocking.
    pub fn set_name_status(
        &self,
        avatar_id: ObjectId,
        status: WishNameState,
    ) -> Result<(), NameDbError> {
        self.services.namedb.set_name_status(avatar_id, status)?;
        audit!("nameVerdict", avatar_id, status = status.as_str());
        Ok(())
    }

    /// Kind of the login in flight on `connection`.
    pub fn connection_operation(&self, connection: Channel) -> Option<OperationKind> {
        self.connections.get(&connection).map(|live| live.kind)
    }

    /// Kind of the operation in flight on `account_id`.
    pub fn account_operation(&self, account_id: ObjectId) -> Option<OperationKind> {
        self.accounts.get(&account_id).map(|live| live.kind)
    }

    /// Total live operations.
    pub fn in_flight(&self) -> usize {
        self.connections.len() + self.accounts.len()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::{ChannelFabric, FabricCommand};
    use crate::store::MemoryRecordStore;

    fn dispatcher() -> (Arc<SessionDispatcher>, mpsc::UnboundedReceiver<FabricCommand>) {
        let (fabric, rx) = ChannelFabric::new();
        let params = DispatcherParams::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(fabric),
            AccountNameDb::in_memory().unwrap(),
            "unit-test-login-secret-0123",
        );
        (SessionDispatcher::new(params).unwrap(), rx)
    }

    fn eject_reason(rx: &mut mpsc::UnboundedReceiver<FabricCommand>) -> (Channel, u16, String) {
        match rx.try_recv().unwrap() {
            FabricCommand::Eject {
                target,
                code,
                reason,
            } => (target, code, reason),
            other => panic!("expected eject, got {other:?}"),
        }
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let (d, _rx) = dispatcher();
        let a = d.login_digest("alice");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, d.login_digest("alice"));
        assert_ne!(a, d.login_digest("bob"));
    }

    #[tokio::test]
    async fn bad_digest_is_ejected() {
        let (d, mut rx) = dispatcher();
        let conn = Channel(1_000_000_001);
        let result = d.handle(
            conn,
            ClientRequest::Login {
                token: "alice".into(),
                digest: "00".into(),
            },
        );
        assert!(matches!(result, Dispatch::Rejected(_)));
        assert_eq!(eject_reason(&mut rx), (conn, EJECT_KILLED, "The account server rejected your token.".into()));
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn account_request_requires_login() {
        let (d, mut rx) = dispatcher();
        let conn = Channel(1_000_000_002);
        let result = d.handle(conn, ClientRequest::RequestAvatars);
        assert!(matches!(result, Dispatch::Rejected(ref r) if r == "Client is not logged in."));
        assert_eq!(eject_reason(&mut rx).0, conn);
    }

    #[tokio::test]
    async fn login_from_bound_sender_is_rejected() {
        let (d, mut rx) = dispatcher();
        let sender = Channel::identity(100_000_000, 0);
        let digest = d.login_digest("alice");
        let result = d.handle(
            sender,
            ClientRequest::Login {
                token: "alice".into(),
                digest,
            },
        );
        assert!(matches!(result, Dispatch::Rejected(ref r) if r == "Client is already logged in."));
        assert_eq!(eject_reason(&mut rx).0, sender);
    }

    #[tokio::test]
    async fn unchoose_without_active_avatar_is_ignored() {
        let (d, mut rx) = dispatcher();
        let sender = Channel::identity(100_000_000, 0);
        let result = d.handle(sender, ClientRequest::ChooseAvatar { avatar_id: 0 });
        assert!(matches!(result, Dispatch::Ignored));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn choose_while_active_ejects_account() {
        let (d, mut rx) = dispatcher();
        let sender = Channel::identity(100_000_000, 100_000_001);
        let result = d.handle(sender, ClientRequest::ChooseAvatar { avatar_id: 100_000_002 });
        assert!(matches!(result, Dispatch::Rejected(ref r) if r == "An avatar is already chosen!"));
        assert_eq!(eject_reason(&mut rx).0, Channel::account(100_000_000));
    }
}
