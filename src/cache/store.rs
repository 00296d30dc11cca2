//! Durable key-value storage for cached revisions and branch tables
//!
//! The SQLite store lives in the user cache directory by default and holds a
//! single `kv` table. Values are opaque bytes; callers pick the encoding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};

use crate::context::Shared;
use crate::error::{Result, SvnError};

/// Byte store keyed by strings
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| SvnError::Cache {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        // journal_mode returns a row, so it cannot go through execute_batch
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(|e| Self::error(path, "Failed to enable WAL", e))?;
        Self::init(conn, path.to_path_buf())
    }

    /// Database that lives only as long as the store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SvnError::Cache {
            message: format!("Failed to open in-memory database: {}", e),
        })?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, db_path: PathBuf) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            "#,
        )
        .map_err(|e| Self::error(&db_path, "Failed to create schema", e))?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn error(path: &Path, what: &str, e: rusqlite::Error) -> SvnError {
        SvnError::Cache {
            message: format!("{} ({}): {}", what, path.display(), e),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>, what: &str) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(|| SvnError::Cache {
            message: format!("{} is closed", self.db_path.display()),
        })?;
        f(conn).map_err(|e| Self::error(&self.db_path, what, e))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(
            |conn| {
                conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()
            },
            "Read failed",
        )
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_conn(
            |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )
                .map(|_| ())
            },
            "Write failed",
        )
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        self.with_conn(
            |conn| {
                conn.execute(
                    "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
                    params![prefix],
                )
            },
            "Delete failed",
        )
    }
}

#[async_trait]
impl Shared for SqliteStore {
    fn name(&self) -> &'static str {
        "cache-db"
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| Self::error(&self.db_path, "Close failed", e))?;
            tracing::info!("Closed cache database {}", self.db_path.display());
        }
        Ok(())
    }
}

/// In-process store, used for tests and when persistence is disabled
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}

#[async_trait]
impl Shared for MemoryStore {
    fn name(&self) -> &'static str {
        "memory-cache"
    }
}
