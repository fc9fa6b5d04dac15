//! Durable fallback store for the broker.
//!
//! Messages that exhaust their delivery attempts are written here, keyed by
//! message id. The store is a single logical collection (`log`) with
//! idempotent put-by-key and get-by-key.
//!
//! - [`SqliteStore`]: SQLite file driven by a dedicated executor thread
//! - [`MemoryStore`]: process-local map, for tests and dry runs

mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

/// Name of the single collection holding archived messages.
pub const LOG_COLLECTION: &str = "log";

/// Key/value persistence used when a message cannot be delivered.
#[async_trait]
pub trait FallbackStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// List every key in the collection, in key order.
    async fn keys(&self) -> StoreResult<Vec<String>>;

    /// Flush and release the backing resources. Later calls fail.
    async fn close(&self) -> StoreResult<()>;

    /// Check if a key exists.
    async fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
