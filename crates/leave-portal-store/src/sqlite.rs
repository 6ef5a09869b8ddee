//! SQLite-backed [`KeyValueStore`].
//!
//! The store survives process restarts the way browser local storage
//! survives page reloads. A single `kv_store` table holds every entry.
//!
//! The `rusqlite::Connection` is `!Sync`, so it lives behind a `Mutex`; each
//! operation is one short statement and the lock is never held across an
//! `.await`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{StoreError, StoreResult};
use crate::kv::KeyValueStore;

/// Durable key/value store in a SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the file cannot be opened, or
    /// [`StoreError::Migration`] if the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening session storage");

        let conn = Connection::open(path)?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        tracing::debug!("opening in-memory session storage");

        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure_connection(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn run_migrations(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| StoreError::Migration {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp()],
        )?;
        tracing::debug!(key = key, "storage entry written");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        if rows > 0 {
            tracing::debug!(key = key, "storage entry removed");
        }
        Ok(())
    }

    fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "DELETE FROM kv_store WHERE key = ?1 RETURNING value",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_works() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn set_then_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("currentUser", "{\"id\":\"1\"}").unwrap();
        assert_eq!(
            store.get("currentUser").unwrap().as_deref(),
            Some("{\"id\":\"1\"}")
        );
    }

    #[test]
    fn set_is_upsert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn take_is_single_use() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("auth_state", "abc").unwrap();
        assert_eq!(store.take("auth_state").unwrap().as_deref(), Some("abc"));
        assert!(store.take("auth_state").unwrap().is_none());
        assert!(store.get("auth_state").unwrap().is_none());
    }

    #[test]
    fn remove_missing_key_is_ok() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.remove("nothing").unwrap();
    }

    #[test]
    fn sqlite_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteStore>();
    }
}
