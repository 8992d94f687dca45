//! Key/value persistence for subscription state.
//!
//! Each logical table (subscriptions, events, settings, pinned ids) is one
//! JSON document under one key, read and written whole. Writers must
//! read-merge-write so they do not clobber each other.

use dashmap::DashMap;
use eyre::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Table holding subscriptions keyed by id.
pub const SUBSCRIPTIONS_KEY: &str = "explorer.event_subscriptions";
/// Table holding the bounded event log, newest first.
pub const EVENTS_KEY: &str = "explorer.event_log";
/// Table holding [`crate::subscriptions::EventSettings`].
pub const SETTINGS_KEY: &str = "explorer.event_settings";
/// Table holding pinned event ids.
pub const PINNED_KEY: &str = "explorer.pinned_events";

/// Durable string key/value store.
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;

    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Loads and parses a table, falling back to `T::default()` when it is
/// absent or unreadable.
pub fn load_table<T>(storage: &dyn Storage, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = storage.load(key)? else {
        return Ok(T::default());
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unreadable table");
            Ok(T::default())
        }
    }
}

/// Serializes and writes a whole table.
pub fn save_table<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).wrap_err_with(|| format!("failed to encode {key}"))?;
    storage.save(key, &raw)
}

/// Process-local storage, for tests and non-interactive runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tables.get(key).map(|value| value.clone()))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.tables.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite-backed storage with WAL mode, one row per table.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates or opens a SQLite database and ensures the `kv` table exists.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrated.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open SQLite database at {path}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Storage for SqliteStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| row.get(0))
            .optional()
            .wrap_err_with(|| format!("failed to read {key}"))?;
        Ok(value)
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "
                INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                ",
                rusqlite::params![key, value, chrono::Utc::now().to_rfc3339()],
            )
            .wrap_err_with(|| format!("failed to write {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn memory_round_trips_tables() {
        let storage = MemoryStorage::new();
        let mut table = BTreeMap::new();
        table.insert("a".to_string(), 1u64);
        save_table(&storage, "t", &table).expect("save should succeed");

        let loaded: BTreeMap<String, u64> = load_table(&storage, "t").expect("load should succeed");
        assert_eq!(loaded, table);
    }

    #[test]
    fn unreadable_table_falls_back_to_default() {
        let storage = MemoryStorage::new();
        storage.save("t", "{not json").expect("save should succeed");
        let loaded: Vec<u64> = load_table(&storage, "t").expect("load should succeed");
        assert!(loaded.is_empty());
    }

    #[test]
    fn sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("explorer.sqlite");
        let path = path.to_str().expect("utf-8 path");

        {
            let storage = SqliteStorage::new(path).expect("sqlite should open");
            storage.save(SETTINGS_KEY, "{\"a\":1}").expect("save should succeed");
            storage.save(SETTINGS_KEY, "{\"a\":2}").expect("overwrite should succeed");
        }

        let storage = SqliteStorage::new(path).expect("sqlite should reopen");
        assert_eq!(
            storage.load(SETTINGS_KEY).expect("load should succeed"),
            Some("{\"a\":2}".to_string())
        );
        assert_eq!(storage.load(EVENTS_KEY).expect("load should succeed"), None);
    }
}
