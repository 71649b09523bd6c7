//! Test server management.
//!
//! Runs a [`SessionDispatcher`] in-process on an in-memory record store and
//! an in-memory name database. Fabric commands are drained on demand into a
//! simulated router that tracks, per connection, the channels it listens on,
//! its sender identity, what it received and whether it was ejected.

use avatar_sessions::fabric::{ChannelFabric, CleanupAction, ClientState, FabricCommand};
use avatar_sessions::namedb::AccountNameDb;
use avatar_sessions::protocol::{ClientRequest, ClientResponse};
use avatar_sessions::records::{AccountRecord, AvatarRecord, EstateRecord, Record};
use avatar_sessions::store::MemoryRecordStore;
use avatar_sessions::{Channel, Dispatch, DispatcherParams, ObjectId, Outcome, SessionDispatcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub const LOGIN_SECRET: &str = "integration-login-secret-0123456789";

/// First simulated connection channel.
const FIRST_CONNECTION: u64 = 1_000_000_001;

/// A valid peach dog.
pub fn sample_dna() -> Vec<u8> {
    vec![b't', 0, 1, 2, 1, 0, 1, 0, 1, 1, 3, 4, 3, 4, 2, 5]
}

/// Poll `check` until it holds, for work the engine finishes in the background.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Router-side view of one connection.
#[derive(Debug)]
pub struct Connection {
    pub identity: Channel,
    pub subscriptions: HashSet<Channel>,
    pub inbox: Vec<ClientResponse>,
    pub ejected: Option<(u16, String)>,
    pub state: ClientState,
    pub cleanups: Vec<CleanupAction>,
    pub session_objects: HashSet<ObjectId>,
}

impl Connection {
    fn new(channel: Channel) -> Self {
        Self {
            identity: channel,
            subscriptions: HashSet::from([channel]),
            inbox: Vec::new(),
            ejected: None,
            state: ClientState::Anonymous,
            cleanups: Vec::new(),
            session_objects: HashSet::new(),
        }
    }
}

#[derive(Default)]
struct Router {
    connections: HashMap<Channel, Connection>,
    log: Vec<FabricCommand>,
}

impl Router {
    /// Every connection listening on `channel`.
    fn listeners(&mut self, channel: Channel) -> impl Iterator<Item = &mut Connection> {
        self.connections
            .values_mut()
            .filter(move |conn| conn.subscriptions.contains(&channel))
    }

    fn apply(&mut self, command: FabricCommand) {
        match &command {
            FabricCommand::Send { target, message } => {
                for conn in self.listeners(*target) {
                    conn.inbox.push(message.clone());
                }
            }
            FabricCommand::OpenChannel {
                connection,
                channel,
            } => {
                for conn in self.listeners(*connection) {
                    conn.subscriptions.insert(*channel);
                }
            }
            FabricCommand::CloseChannel {
                connection,
                channel,
            } => {
                let channel = *channel;
                for conn in self.listeners(*connection) {
                    conn.subscriptions.remove(&channel);
                }
            }
            FabricCommand::SetIdentity {
                connection,
                identity,
            } => {
                for conn in self.listeners(*connection) {
                    conn.identity = *identity;
                }
            }
            FabricCommand::SetClientState { connection, state } => {
                for conn in self.listeners(*connection) {
                    conn.state = *state;
                }
            }
            FabricCommand::Eject {
                target,
                code,
                reason,
            } => {
                for conn in self.listeners(*target) {
                    conn.ejected = Some((*code, reason.clone()));
                    conn.subscriptions.clear();
                }
            }
            FabricCommand::AddDisconnectCleanup { connection, action } => {
                for conn in self.listeners(*connection) {
                    conn.cleanups.push(action.clone());
                }
            }
            FabricCommand::ClearDisconnectCleanups { connection } => {
                for conn in self.listeners(*connection) {
                    conn.cleanups.clear();
                }
            }
            FabricCommand::AddSessionObject { connection, object } => {
                for conn in self.listeners(*connection) {
                    conn.session_objects.insert(*object);
                }
            }
            FabricCommand::RemoveSessionObject { connection, object } => {
                let object = *object;
                for conn in self.listeners(*connection) {
                    conn.session_objects.remove(&object);
                }
            }
            FabricCommand::GrantOwnership { .. }
            | FabricCommand::Activate { .. }
            | FabricCommand::DeleteObject { .. }
            | FabricCommand::Presence(_) => {}
        }
        self.log.push(command);
    }
}

/// A test server instance.
pub struct TestServer {
    pub dispatcher: Arc<SessionDispatcher>,
    pub store: Arc<MemoryRecordStore>,
    pub namedb: AccountNameDb,
    commands: Mutex<mpsc::UnboundedReceiver<FabricCommand>>,
    router: Mutex<Router>,
    next_connection: AtomicU64,
}

impl TestServer {
    pub fn start() -> Arc<Self> {
        Self::start_with(|_| {})
    }

    /// Start with dispatcher params adjusted by `tune`.
    pub fn start_with(tune: impl FnOnce(&mut DispatcherParams)) -> Arc<Self> {
        let store = Arc::new(MemoryRecordStore::new());
        let namedb = AccountNameDb::in_memory().expect("in-memory name database");
        let (fabric, commands) = ChannelFabric::new();

        let mut params =
            DispatcherParams::new(store.clone(), Arc::new(fabric), namedb.clone(), LOGIN_SECRET);
        tune(&mut params);
        let dispatcher = SessionDispatcher::new(params).expect("dispatcher");

        Arc::new(Self {
            dispatcher,
            store,
            namedb,
            commands: Mutex::new(commands),
            router: Mutex::new(Router::default()),
            next_connection: AtomicU64::new(FIRST_CONNECTION),
        })
    }

    /// Open a new raw connection.
    pub fn connect(&self) -> Channel {
        let channel = Channel(self.next_connection.fetch_add(1, Ordering::Relaxed));
        self.router
            .lock()
            .connections
            .insert(channel, Connection::new(channel));
        channel
    }

    /// Route every command posted so far.
    pub fn pump(&self) {
        let mut commands = self.commands.lock();
        let mut router = self.router.lock();
        while let Ok(command) = commands.try_recv() {
            router.apply(command);
        }
    }

    pub fn with_connection<R>(&self, conn: Channel, f: impl FnOnce(&Connection) -> R) -> R {
        self.pump();
        let router = self.router.lock();
        f(router.connections.get(&conn).expect("unknown connection"))
    }

    pub fn identity(&self, conn: Channel) -> Channel {
        self.with_connection(conn, |c| c.identity)
    }

    pub fn ejection(&self, conn: Channel) -> Option<(u16, String)> {
        self.with_connection(conn, |c| c.ejected.clone())
    }

    pub fn take_responses(&self, conn: Channel) -> Vec<ClientResponse> {
        self.pump();
        let mut router = self.router.lock();
        std::mem::take(&mut router.connections.get_mut(&conn).expect("unknown connection").inbox)
    }

    /// Every command routed so far, in order.
    pub fn command_log(&self) -> Vec<FabricCommand> {
        self.pump();
        self.router.lock().log.clone()
    }

    pub fn clear_command_log(&self) {
        self.pump();
        self.router.lock().log.clear();
    }

    /// Send `request` under the connection's current identity.
    pub fn send(&self, conn: Channel, request: ClientRequest) -> Dispatch {
        let sender = self.identity(conn);
        self.dispatcher.handle(sender, request)
    }

    /// Send `request` and wait for its operation to go Off.
    pub async fn call(&self, conn: Channel, request: ClientRequest) -> Outcome {
        let outcome = match self.send(conn, request) {
            Dispatch::Started(handle) => handle.await.expect("operation task panicked"),
            other => panic!("expected an operation to start, got {other:?}"),
        };
        self.pump();
        outcome
    }

    /// The fabric dropped this connection.
    pub fn disconnect(&self, conn: Channel) {
        self.dispatcher.connection_lost(conn);
    }

    pub fn account(&self, id: ObjectId) -> AccountRecord {
        self.store
            .get(id)
            .and_then(Record::into_account)
            .expect("account record")
    }

    pub fn avatar(&self, id: ObjectId) -> AvatarRecord {
        self.store
            .get(id)
            .and_then(Record::into_avatar)
            .expect("avatar record")
    }

    pub fn estate(&self, id: ObjectId) -> EstateRecord {
        match self.store.get(id) {
            Some(Record::Estate(estate)) => estate,
            other => panic!("expected estate record, got {other:?}"),
        }
    }
}
