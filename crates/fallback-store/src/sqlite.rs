//! SQLite-backed fallback store.
//!
//! All statements run on the single executor thread owned by
//! `tokio_rusqlite::Connection`; callers only await the result.

use crate::{FallbackStore, StoreError, StoreResult, LOG_COLLECTION};
use async_trait::async_trait;
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::ConnectionClosed => StoreError::Closed,
        other => StoreError::Connection(other.to_string()),
    }
}

/// Fallback store persisted in a SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
    path: String,
}

impl SqliteStore {
    /// Open (or create) the store file and its `log` collection.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::init(conn, path_str).await
    }

    /// Open a store that lives only as long as the process.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Self::init(conn, ":memory:".to_string()).await
    }

    async fn init(conn: Connection, path: String) -> StoreResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(&format!(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                CREATE TABLE IF NOT EXISTS {LOG_COLLECTION} (
                    key BLOB PRIMARY KEY NOT NULL,
                    value BLOB NOT NULL
                );
                "
            ))?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        info!(path = %path, collection = LOG_COLLECTION, "Fallback store opened");
        Ok(Self { conn, path })
    }
}

#[async_trait]
impl FallbackStore for SqliteStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let key_bytes = key.as_bytes().to_vec();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT OR REPLACE INTO {LOG_COLLECTION} (key, value) VALUES (?1, ?2)"),
                    rusqlite::params![key_bytes, value],
                )?;
                Ok(())
            })
            .await
            .map_err(from_tokio_rusqlite)?;

        debug!(key = %key, "Stored fallback entry");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key_bytes = key.as_bytes().to_vec();
        self.conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        &format!("SELECT value FROM {LOG_COLLECTION} WHERE key = ?1"),
                        [key_bytes],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT key FROM {LOG_COLLECTION} ORDER BY key"))?;
                let keys = stmt
                    .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                    .map(|key| key.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn close(&self) -> StoreResult<()> {
        self.conn
            .clone()
            .close()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to close store: {}", e)))?;
        info!(path = %self.path, "Fallback store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_then_get() {
        let store = SqliteStore::open_in_memory().await.unwrap();

        store.put("m1", br#"{"Id":"m1","Period":50}"#.to_vec()).await.unwrap();

        let value = store.get("m1").await.unwrap().unwrap();
        assert_eq!(value, br#"{"Id":"m1","Period":50}"#.to_vec());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let store = SqliteStore::open_in_memory().await.unwrap();

        store.put("m1", b"first".to_vec()).await.unwrap();
        store.put("m1", b"second".to_vec()).await.unwrap();

        assert_eq!(store.get("m1").await.unwrap().unwrap(), b"second".to_vec());
        assert_eq!(store.keys().await.unwrap(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("log.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store.put("b", b"2".to_vec()).await.unwrap();
        store.put("a", b"1".to_vec()).await.unwrap();
        store.close().await.unwrap();

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(reopened.keys().await.unwrap(), vec!["a", "b"]);
        assert!(reopened.contains("b").await.unwrap());
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.close().await.unwrap();

        assert!(store.put("m1", b"x".to_vec()).await.is_err());
    }
}
