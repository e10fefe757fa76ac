//! SQLite-backed settings store.
//!
//! Provides persistent storage for:
//! - The settings key-value table (JSON values)
//! - Installed dynamic block rules (see [`RuleTable`](crate::host::RuleTable))
//! - Pending alarms (see [`AlarmTable`](crate::host::AlarmTable))

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{data_dir, migrations, SettingsStore, StorageChange, StorageMap};
use crate::error::{CoreError, DatabaseError, HostApiError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// SQLite database holding all durable extension state.
pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StorageChange>,
}

impl Database {
    /// Open the database at `~/.config/stayfocused/stayfocused.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("stayfocused.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests and embedding).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, DatabaseError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DatabaseError::QueryFailed("connection mutex poisoned".into()))?;
        f(&conn).map_err(DatabaseError::from)
    }
}

fn kv_get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get::<_, String>(0)
    })
    .optional()
}

fn parse_stored(key: &str, raw: &str) -> Result<Value, HostApiError> {
    serde_json::from_str(raw)
        .map_err(|e| HostApiError::Storage(format!("malformed value for '{key}': {e}")))
}

#[async_trait]
impl SettingsStore for Database {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, HostApiError> {
        let raw = self.with_conn(|conn| {
            let mut out = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(value) = kv_get(conn, key)? {
                    out.push((key.to_string(), value));
                }
            }
            Ok(out)
        })?;

        raw.into_iter()
            .map(|(k, v)| {
                let value = parse_stored(&k, &v)?;
                Ok((k, value))
            })
            .collect()
    }

    async fn get_all(&self) -> Result<StorageMap, HostApiError> {
        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM kv ORDER BY key")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        raw.into_iter()
            .map(|(k, v)| {
                let value = parse_stored(&k, &v)?;
                Ok((k, value))
            })
            .collect()
    }

    async fn set(&self, items: StorageMap) -> Result<(), HostApiError> {
        let encoded: Vec<(String, String, Value)> = items
            .into_iter()
            .map(|(k, v)| Ok((k, serde_json::to_string(&v)?, v)))
            .collect::<Result<_, serde_json::Error>>()?;

        let previous = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut previous = Vec::with_capacity(encoded.len());
            for (key, json, _) in &encoded {
                previous.push(kv_get(&tx, key)?);
                tx.execute(
                    "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                    params![key, json],
                )?;
            }
            tx.commit()?;
            Ok(previous)
        })?;

        for ((key, _, new_value), old_raw) in encoded.into_iter().zip(previous) {
            let old_value = old_raw.and_then(|raw| serde_json::from_str::<Value>(&raw).ok());
            if old_value.as_ref() == Some(&new_value) {
                continue;
            }
            // No receivers is fine.
            let _ = self.changes.send(StorageChange {
                key,
                old_value,
                new_value: Some(new_value),
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, storage_map};
    use serde_json::json;

    #[tokio::test]
    async fn get_omits_missing_keys() {
        let db = Database::open_memory().unwrap();
        db.set(storage_map([(keys::FOCUS_STATE, true)]).unwrap())
            .await
            .unwrap();

        let map = db.get(&[keys::FOCUS_STATE, keys::END_TIME]).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[keys::FOCUS_STATE], json!(true));
    }

    #[tokio::test]
    async fn last_write_wins() {
        let db = Database::open_memory().unwrap();
        db.set(storage_map([(keys::DEFAULT_DURATION, 30)]).unwrap())
            .await
            .unwrap();
        db.set(storage_map([(keys::DEFAULT_DURATION, 45)]).unwrap())
            .await
            .unwrap();
        let all = db.get_all().await.unwrap();
        assert_eq!(all[keys::DEFAULT_DURATION], json!(45));
    }

    #[tokio::test]
    async fn set_publishes_only_real_changes() {
        let db = Database::open_memory().unwrap();
        let mut rx = db.subscribe();

        db.set(storage_map([(keys::FOCUS_STATE, true)]).unwrap())
            .await
            .unwrap();
        db.set(storage_map([(keys::FOCUS_STATE, true)]).unwrap())
            .await
            .unwrap();
        db.set(storage_map([(keys::FOCUS_STATE, false)]).unwrap())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.old_value, None);
        assert_eq!(first.new_value, Some(json!(true)));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.old_value, Some(json!(true)));
        assert_eq!(second.new_value, Some(json!(false)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stayfocused.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set(storage_map([(keys::BLOCK_MODE, "indefinite")]).unwrap())
                .await
                .unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        let map = db.get(&[keys::BLOCK_MODE]).await.unwrap();
        assert_eq!(map[keys::BLOCK_MODE], json!("indefinite"));
    }
}
