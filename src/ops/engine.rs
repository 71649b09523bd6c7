//! Generic suspend/resume engine.
//!
//! An operation runs as one tokio task owning its [`Operation`] value and a
//! mailbox. Each asynchronous call is spawned as a separate task that posts
//! its [`CallReply`] into the mailbox tagged with the generation current when
//! it was issued. The generation advances on every state entry, so a reply
//! that arrives after the operation has moved on is recognised and dropped.
//!
//! The operation keeps only a weak handle to its own mailbox. Whoever spawned
//! it holds the strong sender; once every holder drops it and no call is
//! outstanding, the mailbox closes and the operation is killed as
//! disconnected.

use super::{CallReply, OpEvent, Operation, Outcome, Services, Step, Target};
use crate::error::{OperationError, RouterError};
use crate::fabric::{EJECT_KILLED, Fabric, FabricCommand};
use crate::ids::ObjectId;
use crate::metrics;
use crate::protocol::ClientResponse;
use crate::records::{Field, Record, RecordType, WishNameState};
use crate::telemetry::OperationTimer;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Called exactly once when the operation goes Off.
pub type Release = Box<dyn FnOnce() + Send>;

/// Per-operation handle to the collaborators and the mailbox.
pub struct OpContext {
    services: Arc<Services>,
    events: mpsc::WeakUnboundedSender<OpEvent>,
    target: Target,
    generation: u64,
    waiting_for: &'static str,
}

impl OpContext {
    pub fn new(
        services: Arc<Services>,
        events: &mpsc::UnboundedSender<OpEvent>,
        target: Target,
    ) -> Self {
        Self {
            services,
            events: events.downgrade(),
            target,
            generation: 0,
            waiting_for: "nothing",
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn fabric(&self) -> &dyn Fabric {
        self.services.fabric.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Issue one asynchronous call whose reply resumes the current state.
    fn call<F>(&mut self, what: &'static str, fut: F)
    where
        F: Future<Output = CallReply> + Send + 'static,
    {
        self.waiting_for = what;
        let Some(events) = self.events.upgrade() else {
            debug!(call = what, "Mailbox abandoned, call not issued");
            return;
        };
        let generation = self.generation;
        tokio::spawn(async move {
            let reply = fut.await;
            // Operation already gone: the reply is stale by definition.
            let _ = events.send(OpEvent::Reply { generation, reply });
        });
    }

    // ------------------------------------------------------------------------
    // Record store
    // ------------------------------------------------------------------------

    pub fn fetch(&mut self, id: ObjectId) {
        let store = Arc::clone(&self.services.store);
        self.call("record fetch", async move {
            CallReply::Fetched {
                id,
                result: store.fetch(id).await,
            }
        });
    }

    pub fn create(&mut self, record: Record) {
        let store = Arc::clone(&self.services.store);
        self.call("record create", async move {
            CallReply::Created(store.create(record).await)
        });
    }

    pub fn update(&mut self, id: ObjectId, kind: RecordType, changes: Vec<Field>, expected: Vec<Field>) {
        let store = Arc::clone(&self.services.store);
        self.call("record update", async move {
            CallReply::Updated(store.update(id, kind, changes, expected).await)
        });
    }

    /// Unguarded fire-and-forget update; failures are only logged.
    pub fn update_detached(&self, id: ObjectId, kind: RecordType, changes: Vec<Field>) {
        let store = Arc::clone(&self.services.store);
        tokio::spawn(async move {
            if let Err(e) = store.update(id, kind, changes, Vec::new()).await {
                warn!(object = id, kind = %kind, error = %e, "Detached record update failed");
            }
        });
    }

    // ------------------------------------------------------------------------
    // Account name database (blocking, runs on the blocking pool)
    // ------------------------------------------------------------------------

    pub fn lookup_login(&mut self, login_id: String) {
        let namedb = self.services.namedb.clone();
        self.call("account lookup", async move {
            let result = tokio::task::spawn_blocking(move || namedb.lookup(&login_id)).await;
            CallReply::LoginLookup(flatten(result))
        });
    }

    pub fn store_login(&mut self, login_id: String, account_id: ObjectId) {
        let namedb = self.services.namedb.clone();
        self.call("account binding", async move {
            let result =
                tokio::task::spawn_blocking(move || namedb.store_account_id(&login_id, account_id))
                    .await;
            CallReply::LoginStored(flatten(result))
        });
    }

    pub fn add_name_request(&mut self, avatar_id: ObjectId, name: String) {
        let namedb = self.services.namedb.clone();
        self.call("name request", async move {
            let result =
                tokio::task::spawn_blocking(move || namedb.add_name_request(avatar_id, &name)).await;
            CallReply::NameRequested(flatten(result))
        });
    }

    /// Look up the moderation verdict for a pending avatar and, when it has
    /// been decided, write it back to the avatar record.
    pub fn reconcile_name(&mut self, avatar_id: ObjectId) {
        let namedb = self.services.namedb.clone();
        let store = Arc::clone(&self.services.store);
        self.call("moderation verdict", async move {
            let status =
                flatten(tokio::task::spawn_blocking(move || namedb.name_status(avatar_id)).await);
            if let Ok(Some(verdict @ (WishNameState::Approved | WishNameState::Rejected))) = status
                && let Err(e) = store
                    .update(
                        avatar_id,
                        RecordType::Avatar,
                        vec![Field::WishNameState(verdict)],
                        vec![Field::WishNameState(WishNameState::Pending)],
                    )
                    .await
            {
                warn!(avatar_id, error = %e, "Failed to record moderation verdict");
            }
            CallReply::NameVerdict {
                id: avatar_id,
                result: status,
            }
        });
    }

    /// Drop the moderation-ledger entry for an avatar; failures are logged.
    pub fn remove_name_request(&self, avatar_id: ObjectId) {
        let namedb = self.services.namedb.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = namedb.remove_name_request(avatar_id) {
                warn!(avatar_id, error = %e, "Failed to remove name request");
            }
        });
    }

    // ------------------------------------------------------------------------
    // Fabric
    // ------------------------------------------------------------------------

    pub fn post(&self, command: FabricCommand) -> Result<(), OperationError> {
        self.fabric().post(command).map_err(OperationError::from)
    }

    /// Send a response to the target actor's channel.
    pub fn reply(&self, message: ClientResponse) -> Result<(), OperationError> {
        self.fabric()
            .send(self.target.channel(), message)
            .map_err(OperationError::from)
    }

    fn eject(&self, err: &OperationError) -> Result<(), RouterError> {
        self.fabric()
            .eject(self.target.channel(), EJECT_KILLED, &err.to_string())
    }
}

fn flatten<T, E: std::fmt::Display>(
    result: Result<Result<T, E>, tokio::task::JoinError>,
) -> Result<T, String> {
    match result {
        Ok(inner) => inner.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Drive `op` from `Start` until it goes Off.
pub async fn run(
    mut op: Operation,
    mut cx: OpContext,
    mut mailbox: mpsc::UnboundedReceiver<OpEvent>,
    release: Release,
) -> Outcome {
    let kind = op.kind();
    let timer = OperationTimer::start();
    metrics::record_started(kind.name());

    let mut step = Step::Enter;
    loop {
        step = match step {
            Step::Enter => {
                cx.generation += 1;
                debug!(state = op.state_name(), generation = cx.generation, "Entering state");
                op.enter(&mut cx)
            }
            Step::Suspend => {
                let event = match cx.services.reply_timeout {
                    Some(deadline) => match tokio::time::timeout(deadline, mailbox.recv()).await {
                        Ok(event) => event,
                        Err(_) => {
                            step = Step::Kill(OperationError::TimedOut(cx.waiting_for));
                            continue;
                        }
                    },
                    None => mailbox.recv().await,
                };
                match event {
                    Some(OpEvent::Reply { generation, reply }) if generation == cx.generation => {
                        op.resume(&mut cx, reply)
                    }
                    Some(OpEvent::Reply { generation, .. }) => {
                        trace!(
                            state = op.state_name(),
                            stale = generation,
                            current = cx.generation,
                            "Dropping stale reply"
                        );
                        Step::Suspend
                    }
                    Some(OpEvent::Kill { error }) => Step::Kill(error),
                    // Every sender is gone: nothing can resume or kill us.
                    None => Step::Kill(OperationError::Disconnected),
                }
            }
            Step::Kill(err) => {
                warn!(
                    state = op.state_name(),
                    code = err.error_code(),
                    reason = %err,
                    "Operation killed"
                );
                if let Err(e) = cx.eject(&err) {
                    warn!(error = %e, "Failed to eject killed actor");
                }
                metrics::record_killed(kind.name(), err.error_code(), timer.elapsed_secs());
                release();
                return Outcome::Killed(err);
            }
            Step::Off => {
                debug!("Operation finished");
                metrics::record_completed(kind.name(), timer.elapsed_secs());
                release();
                return Outcome::Completed;
            }
        };
    }
}

/// Spawn `op` as its own task. Returns its join handle and mailbox sender.
pub fn spawn(
    services: Arc<Services>,
    op: Operation,
    release: Release,
) -> (
    tokio::task::JoinHandle<Outcome>,
    mpsc::UnboundedSender<OpEvent>,
) {
    use tracing::Instrument;

    let (tx, rx) = mpsc::unbounded_channel();
    let target = op.target();
    let span = crate::telemetry::spans::operation(op.kind().name(), &target.to_string());
    let cx = OpContext::new(services, &tx, target);
    let handle = tokio::spawn(run(op, cx, rx, release).instrument(span));
    (handle, tx)
}
