//! SQLite-backed record store.
//!
//! Each record is one row: the JSON-encoded [`Record`], its type tag, and a
//! monotonically increasing `version`. Updates are optimistic. The row is
//! read, the expected field snapshot is checked against it, and the new body
//! is written back in a single statement with `WHERE version = ?`. When only
//! the version moved (another writer changed an unrelated field) the update
//! is retried against the fresh row; when a guarded field moved the retry
//! surfaces it as a guard mismatch.

use super::{RecordStore, StoreError};
use crate::ids::ObjectId;
use crate::records::{Field, Record, RecordType, apply_update};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-check-write rounds before an update that keeps losing the version race fails.
const MAX_UPDATE_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) the record database at `path` and apply migrations.
    ///
    /// `":memory:"` opens a private in-memory database. It lives on a single
    /// pinned connection, since every SQLite connection to `:memory:` sees its
    /// own empty database.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend)?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(backend)?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!(
                        "cannot create record directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT);
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await
                .map_err(backend)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("record schema migration failed: {e}")))?;

        info!(path = %path, "Record store connected");
        Ok(Self { pool })
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn decode(id: ObjectId, body: &str) -> Result<Record, StoreError> {
    serde_json::from_str(body)
        .map_err(|e| StoreError::Backend(format!("corrupt record {id}: {e}")))
}

fn encode(record: &Record) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn fetch(&self, id: ObjectId) -> Result<Record, StoreError> {
        let body = sqlx::query_scalar::<_, String>("SELECT body FROM records WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;
        decode(id, &body)
    }

    async fn create(&self, record: Record) -> Result<ObjectId, StoreError> {
        let body = encode(&record)?;
        let result = sqlx::query("INSERT INTO records (kind, body, version) VALUES (?, ?, 0)")
            .bind(record.record_type().as_str())
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        ObjectId::try_from(result.last_insert_rowid())
            .map_err(|_| StoreError::Backend("object id space exhausted".to_string()))
    }

    async fn update(
        &self,
        id: ObjectId,
        kind: RecordType,
        changes: Vec<Field>,
        expected: Vec<Field>,
    ) -> Result<(), StoreError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let (body, version) = sqlx::query_as::<_, (String, i64)>(
                "SELECT body, version FROM records WHERE id = ?",
            )
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound(id))?;

            let mut record = decode(id, &body)?;
            apply_update(id, &mut record, kind, &changes, &expected)?;

            let written = sqlx::query(
                "UPDATE records SET body = ?, version = version + 1 WHERE id = ? AND version = ?",
            )
            .bind(encode(&record)?)
            .bind(id as i64)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

            if written.rows_affected() == 1 {
                return Ok(());
            }
            debug!(id, attempt, "Record changed underneath update, retrying");
        }

        Err(StoreError::Backend(format!(
            "record {id} kept changing during update"
        )))
    }
}
