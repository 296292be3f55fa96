//! SQLite-backed store with file blob support
//!
//! Small values live inline in SQLite, large values (>10KB) as blob files.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::key::blob_path;
use super::{LocalStore, StoreResult, StoredEntry};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Values larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 10 * 1024; // 10KB

/// SQLite-backed [`LocalStore`]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    blobs_dir: PathBuf,
}

impl SqliteStore {
    /// Open or create the store at the default cache location
    pub fn open() -> StoreResult<Self> {
        let dir = Self::default_dir()?;
        Self::open_at(&dir)
    }

    /// Open the store where `config` points, or at the default location
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        match &config.path {
            Some(dir) => Self::open_at(dir),
            None => Self::open(),
        }
    }

    /// Default store directory (~/.cache/safenepal on Linux)
    pub fn default_dir() -> StoreResult<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(StoreError::NoHome)?;
        Ok(cache_base.join("safenepal"))
    }

    /// Open the store in a specific directory
    pub fn open_at(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| StoreError::Io(format!("Failed to create store dir: {}", e)))?;

        let db_path = dir.join("store.db");
        let blobs_dir = dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Store schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                data BLOB,
                blob_path TEXT,
                stored_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE TABLE IF NOT EXISTS sequences (
                name TEXT PRIMARY KEY NOT NULL,
                value INTEGER NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            blobs_dir,
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Io("store connection lock poisoned".to_string()))
    }

    fn read_blob(&self, rel_path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.blobs_dir.join(rel_path))
    }

    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> StoreResult<String> {
        let rel_path = blob_path(namespace, key);
        let full_path = self.blobs_dir.join(&rel_path);
        if let Some(shard_dir) = full_path.parent() {
            std::fs::create_dir_all(shard_dir)
                .map_err(|e| StoreError::Io(format!("Failed to create shard dir: {}", e)))?;
        }

        std::fs::write(&full_path, data)
            .map_err(|e| StoreError::Io(format!("Failed to write blob: {}", e)))?;

        Ok(rel_path)
    }

    fn remove_blob(&self, rel_path: &str) {
        if let Err(e) = std::fs::remove_file(self.blobs_dir.join(rel_path)) {
            log::warn!("Failed to remove blob {}: {}", rel_path, e);
        }
    }

    fn row_to_entry(
        &self,
        conn: &Connection,
        namespace: &str,
        key: String,
        data: Option<Vec<u8>>,
        blob: Option<String>,
        stored_at: i64,
    ) -> Option<StoredEntry> {
        let stored_at = DateTime::from_timestamp_millis(stored_at).unwrap_or_else(Utc::now);
        let data = match (data, blob) {
            (Some(data), None) => data,
            (None, Some(blob)) => match self.read_blob(&blob) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Failed to read blob {}: {}", blob, e);
                    // Drop the dangling row so the key reads as absent from now on
                    let _ = conn.execute(
                        "DELETE FROM entries WHERE namespace = ?1 AND key = ?2",
                        params![namespace, key],
                    );
                    return None;
                }
            },
            _ => return None,
        };

        Some(StoredEntry {
            key,
            data,
            stored_at,
        })
    }

    /// Nuke the store (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> StoreResult<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| StoreError::Io(format!("Failed to remove store DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| StoreError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<StoredEntry>> {
        let conn = self.conn()?;

        let row: Option<(Option<Vec<u8>>, Option<String>, i64)> = conn
            .query_row(
                "SELECT data, blob_path, stored_at FROM entries
                 WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.and_then(|(data, blob, stored_at)| {
            self.row_to_entry(&conn, namespace, key.to_string(), data, blob, stored_at)
        }))
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> StoreResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().timestamp_millis();

        let previous_blob: Option<String> = conn
            .query_row(
                "SELECT blob_path FROM entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        if data.len() <= INLINE_THRESHOLD {
            conn.execute(
                "INSERT OR REPLACE INTO entries
                 (namespace, key, data, blob_path, stored_at, size_bytes)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                params![namespace, key, data, now, data.len()],
            )?;
            if let Some(blob) = previous_blob {
                self.remove_blob(&blob);
            }
        } else {
            // Same (namespace, key) always maps to the same blob file
            let blob = self.write_blob(namespace, key, data)?;
            conn.execute(
                "INSERT OR REPLACE INTO entries
                 (namespace, key, data, blob_path, stored_at, size_bytes)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
                params![namespace, key, blob, now, data.len()],
            )?;
            // Rows moved by `replace_namespace` keep their original blob path
            if let Some(previous) = previous_blob.filter(|p| *p != blob) {
                self.remove_blob(&previous);
            }
        }
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let conn = self.conn()?;

        let blob: Option<String> = conn
            .query_row(
                "SELECT blob_path FROM entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let deleted = conn.execute(
            "DELETE FROM entries WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;

        if let Some(blob) = blob {
            self.remove_blob(&blob);
        }
        Ok(deleted > 0)
    }

    fn list(&self, namespace: &str) -> StoreResult<Vec<StoredEntry>> {
        let conn = self.conn()?;

        let rows: Vec<(String, Option<Vec<u8>>, Option<String>, i64)> = {
            let mut stmt = conn.prepare(
                "SELECT key, data, blob_path, stored_at FROM entries
                 WHERE namespace = ?1 ORDER BY key ASC",
            )?;
            let rows = stmt
                .query_map([namespace], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        Ok(rows
            .into_iter()
            .filter_map(|(key, data, blob, stored_at)| {
                self.row_to_entry(&conn, namespace, key, data, blob, stored_at)
            })
            .collect())
    }

    fn namespaces(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT namespace FROM entries ORDER BY namespace")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn clear_namespace(&self, namespace: &str) -> StoreResult<usize> {
        let conn = self.conn()?;

        let blobs: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT blob_path FROM entries WHERE namespace = ?1 AND blob_path IS NOT NULL",
            )?;
            let blobs = stmt
                .query_map([namespace], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            blobs
        };

        let deleted = conn.execute("DELETE FROM entries WHERE namespace = ?1", [namespace])?;

        for blob in blobs {
            self.remove_blob(&blob);
        }
        Ok(deleted)
    }

    fn replace_namespace(&self, from: &str, to: &str) -> StoreResult<usize> {
        let conn = self.conn()?;

        let tx = conn.unchecked_transaction()?;
        let replaced: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT blob_path FROM entries WHERE namespace = ?1 AND blob_path IS NOT NULL",
            )?;
            let blobs = stmt
                .query_map([to], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            blobs
        };
        tx.execute("DELETE FROM entries WHERE namespace = ?1", [to])?;
        let moved = tx.execute(
            "UPDATE entries SET namespace = ?1 WHERE namespace = ?2",
            params![to, from],
        )?;
        tx.commit()?;

        // Blob names hash the namespace they were written under, so the
        // moved rows never share a file with the ones they replaced
        for blob in replaced {
            self.remove_blob(&blob);
        }
        Ok(moved)
    }

    fn next_sequence(&self, name: &str) -> StoreResult<u64> {
        let conn = self.conn()?;
        let value: i64 = conn.query_row(
            "INSERT INTO sequences (name, value) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value",
            [name],
            |row| row.get(0),
        )?;
        Ok(value as u64)
    }
}
