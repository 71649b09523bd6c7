//! Account-to-connection bindings.
//!
//! A login binds its account to the raw connection that performed it. A
//! later login of the same account rebinds it, so a disconnect arriving from
//! the superseded connection no longer touches the account.

use crate::ids::{Channel, ObjectId};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct SessionTable {
    /// Account id to the connection currently holding it.
    accounts: DashMap<ObjectId, Channel>,
    /// Connection to the account it last logged in as.
    connections: DashMap<Channel, ObjectId>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `account_id` to `connection`, superseding any earlier binding.
    pub fn bind(&self, account_id: ObjectId, connection: Channel) {
        if let Some(previous) = self.accounts.insert(account_id, connection)
            && previous != connection
        {
            debug!(account_id, previous = %previous, connection = %connection, "Account rebound");
        }
        self.connections.insert(connection, account_id);
    }

    /// Forget `connection`. Returns the account it held, if it still held one.
    pub fn unbind(&self, connection: Channel) -> Option<ObjectId> {
        let (_, account_id) = self.connections.remove(&connection)?;
        self.accounts
            .remove_if(&account_id, |_, holder| *holder == connection)
            .map(|(account_id, _)| account_id)
    }

    /// Connection currently holding `account_id`.
    pub fn holder(&self, account_id: ObjectId) -> Option<Channel> {
        self.accounts.get(&account_id).map(|c| *c)
    }

    /// Number of bound accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
