//! Server fabric router interface.
//!
//! The fabric delivers messages to channels and manipulates connection state
//! (subscriptions, sender identity, ejection, disconnect cleanups). Commands
//! are fire-and-forget: the engine only needs them delivered in issue order.
//! [`ChannelFabric`] provides that over an unbounded mpsc queue, which the
//! binary drains to stdout and tests drain into a simulated client.

use crate::error::RouterError;
use crate::ids::{Channel, ObjectId};
use crate::protocol::ClientResponse;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Eject code for a duplicate login of the same account.
pub const EJECT_REDUNDANT_LOGIN: u16 = 100;

/// Eject code for a killed operation or rejected request.
pub const EJECT_KILLED: u16 = 122;

/// Connection client-state levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Pre-login sandbox.
    Anonymous,
    Established,
}

/// Access level granted when activating a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Full,
}

/// Presence-subsystem notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenceEvent {
    ComingOnline {
        avatar_id: ObjectId,
        friends: Vec<ObjectId>,
    },
    GoingOffline {
        avatar_id: ObjectId,
    },
}

/// Action replayed by the fabric when a connection drops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CleanupAction {
    /// Delete the avatar's live session object.
    DeleteObject { object: ObjectId },
    /// Tell presence the avatar went offline.
    Presence(PresenceEvent),
}

/// One routed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FabricCommand {
    Send {
        target: Channel,
        message: ClientResponse,
    },
    OpenChannel {
        connection: Channel,
        channel: Channel,
    },
    CloseChannel {
        connection: Channel,
        channel: Channel,
    },
    SetIdentity {
        connection: Channel,
        identity: Channel,
    },
    SetClientState {
        connection: Channel,
        state: ClientState,
    },
    /// Eject every connection subscribed to `target`.
    Eject {
        target: Channel,
        code: u16,
        reason: String,
    },
    AddDisconnectCleanup {
        connection: Channel,
        action: CleanupAction,
    },
    ClearDisconnectCleanups {
        connection: Channel,
    },
    AddSessionObject {
        connection: Channel,
        object: ObjectId,
    },
    RemoveSessionObject {
        connection: Channel,
        object: ObjectId,
    },
    GrantOwnership {
        connection: Channel,
        object: ObjectId,
    },
    Activate {
        object: ObjectId,
        access: AccessLevel,
    },
    DeleteObject {
        object: ObjectId,
    },
    Presence(PresenceEvent),
}

/// Handle to the server fabric.
pub trait Fabric: Send + Sync {
    /// Queue one command. Commands from one caller are delivered in order.
    fn post(&self, command: FabricCommand) -> Result<(), RouterError>;

    fn send(&self, target: Channel, message: ClientResponse) -> Result<(), RouterError> {
        self.post(FabricCommand::Send { target, message })
    }

    fn eject(&self, target: Channel, code: u16, reason: &str) -> Result<(), RouterError> {
        self.post(FabricCommand::Eject {
            target,
            code,
            reason: reason.to_string(),
        })
    }

    fn open_channel(&self, connection: Channel, channel: Channel) -> Result<(), RouterError> {
        self.post(FabricCommand::OpenChannel {
            connection,
            channel,
        })
    }

    fn close_channel(&self, connection: Channel, channel: Channel) -> Result<(), RouterError> {
        self.post(FabricCommand::CloseChannel {
            connection,
            channel,
        })
    }

    fn set_identity(&self, connection: Channel, identity: Channel) -> Result<(), RouterError> {
        self.post(FabricCommand::SetIdentity {
            connection,
            identity,
        })
    }

    fn add_disconnect_cleanup(
        &self,
        connection: Channel,
        action: CleanupAction,
    ) -> Result<(), RouterError> {
        self.post(FabricCommand::AddDisconnectCleanup { connection, action })
    }

    fn clear_disconnect_cleanups(&self, connection: Channel) -> Result<(), RouterError> {
        self.post(FabricCommand::ClearDisconnectCleanups { connection })
    }
}

/// Fabric handle backed by an unbounded channel.
#[derive(Clone)]
pub struct ChannelFabric {
    tx: mpsc::UnboundedSender<FabricCommand>,
}

impl ChannelFabric {
    /// Create a fabric handle and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FabricCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Fabric for ChannelFabric {
    fn post(&self, command: FabricCommand) -> Result<(), RouterError> {
        self.tx.send(command).map_err(|_| RouterError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_arrive_in_order() {
        let (fabric, mut rx) = ChannelFabric::new();
        let conn = Channel(1_000_000_001);
        fabric.open_channel(conn, Channel::account(5)).unwrap();
        fabric.set_identity(conn, Channel::identity(5, 0)).unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            FabricCommand::OpenChannel { .. }
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            FabricCommand::SetIdentity {
                connection: conn,
                identity: Channel::identity(5, 0)
            }
        );
    }

    #[test]
    fn closed_fabric_reports_error() {
        let (fabric, rx) = ChannelFabric::new();
        drop(rx);
        assert_eq!(
            fabric.eject(Channel(1), EJECT_KILLED, "bye"),
            Err(RouterError::Closed)
        );
    }

    #[test]
    fn command_json_is_tagged() {
        let json = serde_json::to_value(FabricCommand::Eject {
            target: Channel(9),
            code: EJECT_REDUNDANT_LOGIN,
            reason: "x".into(),
        })
        .unwrap();
        assert_eq!(json["op"], "eject");
        assert_eq!(json["code"], 100);
    }
}
