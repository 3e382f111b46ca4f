//! Persistence boundary: an opaque, durable string-keyed store.
//!
//! The engine never talks to SQLite directly; everything goes through
//! [`KvStore`] so tests and the sandbox can substitute an in-memory map.
//! All values are JSON text. Mutations are serialized in-process and every
//! write is appended to an audit log (`guardian.events.jsonl`).

use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait KvStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>, GuardianError>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), GuardianError>;
    fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, GuardianError>;
    fn set_string_list(&self, key: &str, values: &[String]) -> Result<(), GuardianError>;
    fn remove(&self, key: &str) -> Result<(), GuardianError>;
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreEvent {
    pub ts: String,
    pub event_id: String,
    pub op: String,
    pub key: String,
    pub status: String,
}

/// SQLite-backed store: one `kv` table, WAL mode, 5s busy timeout.
pub struct SqliteKvStore {
    root: PathBuf,
    db_path: PathBuf,
}

const KV_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

fn db_connect(db_path: &Path) -> Result<Connection, GuardianError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(GuardianError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(GuardianError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(GuardianError::RusqliteError)?;
    Ok(conn)
}

impl SqliteKvStore {
    pub fn open(root: &Path) -> Result<Self, GuardianError> {
        fs::create_dir_all(root).map_err(GuardianError::IoError)?;
        let store = Self {
            root: root.to_path_buf(),
            db_path: root.join(keys::STORE_DB_NAME),
        };
        store.with_conn("store.init", "-", |conn| {
            conn.execute(KV_SCHEMA, [])?;
            Ok(())
        })?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute a closure with a serialized connection. One writer at a time;
    /// the in-process lock is the whole concurrency story for the store.
    fn with_conn<F, R>(&self, op: &str, key: &str, f: F) -> Result<R, GuardianError>
    where
        F: FnOnce(&Connection) -> Result<R, GuardianError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let conn = db_connect(&self.db_path)?;
        let result = f(&conn);

        let status = if result.is_ok() { "success" } else { "error" };
        self.log_event(op, key, status)?;
        result
    }

    fn log_event(&self, op: &str, key: &str, status: &str) -> Result<(), GuardianError> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let ev = StoreEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            op: op.to_string(),
            key: key.to_string(),
            status: status.to_string(),
        };
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(keys::STORE_EVENTS_LOG))
            .map_err(GuardianError::IoError)?;
        let line = serde_json::to_string(&ev)?;
        writeln!(f, "{}", line).map_err(GuardianError::IoError)?;
        Ok(())
    }
}

impl KvStore for SqliteKvStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, GuardianError> {
        self.with_conn("kv.get", key, |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(GuardianError::RusqliteError)
        })
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), GuardianError> {
        self.with_conn("kv.set", key, |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value, time::now_epoch_z()],
            )?;
            Ok(())
        })
    }

    fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, GuardianError> {
        match self.get_string(key)? {
            None => Ok(None),
            Some(raw) => {
                let list: Vec<String> = serde_json::from_str(&raw)?;
                Ok(Some(list))
            }
        }
    }

    fn set_string_list(&self, key: &str, values: &[String]) -> Result<(), GuardianError> {
        let raw = serde_json::to_string(values)?;
        self.set_string(key, &raw)
    }

    fn remove(&self, key: &str) -> Result<(), GuardianError> {
        self.with_conn("kv.remove", key, |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
    }
}

/// In-memory store for tests and sandbox runs. No audit log, no durability.
#[derive(Default)]
pub struct MemoryKvStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, GuardianError> {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), GuardianError> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, GuardianError> {
        match self.get_string(key)? {
            None => Ok(None),
            Some(raw) => {
                let list: Vec<String> = serde_json::from_str(&raw)?;
                Ok(Some(list))
            }
        }
    }

    fn set_string_list(&self, key: &str, values: &[String]) -> Result<(), GuardianError> {
        let raw = serde_json::to_string(values)?;
        self.set_string(key, &raw)
    }

    fn remove(&self, key: &str) -> Result<(), GuardianError> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(key);
        Ok(())
    }
}
