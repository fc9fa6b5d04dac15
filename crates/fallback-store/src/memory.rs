//! In-memory fallback store.

use crate::{FallbackStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    closed: bool,
}

/// Fallback store that keeps entries in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FallbackStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        inner.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner.entries.get(key).cloned())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner.entries.keys().cloned().collect())
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_put_get_overwrite() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.put("m1", b"a".to_vec()).await.unwrap();
        store.put("m1", b"b".to_vec()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("m1").await.unwrap(), Some(b"b".to_vec()));
        assert!(!store.contains("m2").await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_rejects_after_close() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        assert!(matches!(
            store.put("m1", Vec::new()).await,
            Err(StoreError::Closed)
        ));
    }
}
