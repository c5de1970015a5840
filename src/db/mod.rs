//! Record store for the coordination engine.
//!
//! Everything the engine persists is a row of one shared `memories` table:
//! tasks, claims, unclaims and session lifecycle events. Rows are written once
//! and tasks are the only rows ever updated (their `metadata` map).

pub mod memories;
pub mod query;

use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use query::{Column, Filter, Order, Query};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Hard failures of the underlying store. Domain conditions (not found,
/// duplicate, contested) never show up here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("metadata encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] refinery::Error),

    #[error("database connection lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stored row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MemoryRow {
    /// Monotonic insertion sequence, the recency tie-break for every query.
    pub seq: i64,
    pub id: String,
    pub fold_id: String,
    pub agent: String,
    pub session_id: Option<String>,
    pub message_type: String,
    pub content: Option<String>,
    pub metadata: Map<String, Value>,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
}

impl MemoryRow {
    /// String value of a top-level metadata key.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A row to insert. The store assigns `seq` and `id`.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub fold_id: String,
    pub agent: String,
    pub session_id: Option<String>,
    pub message_type: String,
    pub content: Option<String>,
    pub metadata: Map<String, Value>,
    pub ts: i64,
}

/// Columns an update may overwrite.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub metadata: Option<Map<String, Value>>,
    pub content: Option<String>,
}

impl Patch {
    pub fn metadata(metadata: Map<String, Value>) -> Self {
        Self {
            metadata: Some(metadata),
            content: None,
        }
    }
}

/// The generic select / insert / update verbs the engine is written against.
pub trait RecordStore: Send + Sync {
    /// Rows matching the query, in the query's order, capped at its limit.
    fn select(&self, query: &Query) -> StoreResult<Vec<MemoryRow>>;

    /// Append a row and return it as stored.
    fn insert(&self, record: NewMemory) -> StoreResult<MemoryRow>;

    /// Apply the patch to every row matching the query's filters and return
    /// the number of rows touched. Ordering and limit are ignored.
    fn update(&self, query: &Query, patch: &Patch) -> StoreResult<usize>;
}

/// SQLite-backed record store.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // WAL so several agent processes can share one file
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let mut conn = self.lock()?;
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
