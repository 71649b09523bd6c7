//! Account name database (redb).
//!
//! Maps an external login identity to its internal account id, and keeps the
//! name-moderation ledger (one request per avatar).
//!
//! # Schema
//!
//! ```text
//! LOGIN_BRIDGE:  login_id -> account_id
//! NAME_REQUESTS: avatar_id -> NameRequest (serde_json)
//! ```
//!
//! Calls are synchronous; the operation engine runs them on the blocking pool.

use crate::ids::ObjectId;
use crate::records::WishNameState;
use chrono::Utc;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const LOGIN_BRIDGE: TableDefinition<&str, u32> = TableDefinition::new("login_bridge");

const NAME_REQUESTS: TableDefinition<u32, &[u8]> = TableDefinition::new("name_requests");

/// Errors from the account name database.
#[derive(Debug, Error)]
pub enum NameDbError {
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no name request for avatar {0}")]
    UnknownRequest(ObjectId),

    #[error("{0} is not a moderation verdict")]
    InvalidVerdict(WishNameState),
}

/// A name awaiting (or past) moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
    pub status: WishNameState,
    /// Unix timestamp of the request.
    pub requested_at: i64,
}

/// Login bridge plus moderation ledger.
#[derive(Clone)]
pub struct AccountNameDb {
    db: Arc<Database>,
    auto_approve: bool,
}

impl AccountNameDb {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NameDbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        info!(path = %path.display(), "Account name database opened");
        Self::init(db)
    }

    /// Open a throwaway in-memory database.
    pub fn in_memory() -> Result<Self, NameDbError> {
        let db = redb::Builder::new().create_with_backend(InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, NameDbError> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LOGIN_BRIDGE)?;
            let _ = write_txn.open_table(NAME_REQUESTS)?;
        }
        write_txn.commit()?;
        Ok(Self {
            db: Arc::new(db),
            auto_approve: false,
        })
    }

    /// Record new name requests as already approved.
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Account id bound to `login_id`, if any.
    pub fn lookup(&self, login_id: &str) -> Result<Option<ObjectId>, NameDbError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOGIN_BRIDGE)?;
        Ok(table.get(login_id)?.map(|v| v.value()))
    }

    /// Bind `login_id` to `account_id`.
    pub fn store_account_id(&self, login_id: &str, account_id: ObjectId) -> Result<(), NameDbError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOGIN_BRIDGE)?;
            table.insert(login_id, account_id)?;
        }
        write_txn.commit()?;
        debug!(login = %login_id, account_id, "Stored account binding");
        Ok(())
    }

    /// Register a name request, replacing any previous one for the avatar.
    ///
    /// Returns the status the request was recorded with.
    pub fn add_name_request(
        &self,
        avatar_id: ObjectId,
        name: &str,
    ) -> Result<WishNameState, NameDbError> {
        let status = if self.auto_approve {
            WishNameState::Approved
        } else {
            WishNameState::Pending
        };
        self.put_request(
            avatar_id,
            &NameRequest {
                name: name.to_string(),
                status,
                requested_at: Utc::now().timestamp(),
            },
        )?;
        debug!(avatar_id, name = %name, status = %status, "Name request recorded");
        Ok(status)
    }

    /// Current moderation status; `None` when no request exists.
    pub fn name_status(&self, avatar_id: ObjectId) -> Result<Option<WishNameState>, NameDbError> {
        Ok(self.name_request(avatar_id)?.map(|r| r.status))
    }

    pub fn name_request(&self, avatar_id: ObjectId) -> Result<Option<NameRequest>, NameDbError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NAME_REQUESTS)?;
        let Some(value) = table.get(avatar_id)? else {
            return Ok(None);
        };
        serde_json::from_slice(value.value())
            .map(Some)
            .map_err(|e| NameDbError::Serialization(e.to_string()))
    }

    /// Set a moderation verdict (`APPROVED` or `REJECTED`) on a request.
    pub fn set_name_status(
        &self,
        avatar_id: ObjectId,
        status: WishNameState,
    ) -> Result<(), NameDbError> {
        if !matches!(status, WishNameState::Approved | WishNameState::Rejected) {
            return Err(NameDbError::InvalidVerdict(status));
        }
        let mut request = self
            .name_request(avatar_id)?
            .ok_or(NameDbError::UnknownRequest(avatar_id))?;
        request.status = status;
        self.put_request(avatar_id, &request)?;
        info!(avatar_id, status = %status, "Name verdict recorded");
        Ok(())
    }

    /// Drop the request for `avatar_id`. Returns whether one existed.
    pub fn remove_name_request(&self, avatar_id: ObjectId) -> Result<bool, NameDbError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(NAME_REQUESTS)?;
            table.remove(avatar_id)?.is_some()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn put_request(&self, avatar_id: ObjectId, request: &NameRequest) -> Result<(), NameDbError> {
        let value =
            serde_json::to_vec(request).map_err(|e| NameDbError::Serialization(e.to_string()))?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NAME_REQUESTS)?;
            table.insert(avatar_id, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
