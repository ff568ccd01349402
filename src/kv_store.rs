//! Asynchronous string key-value store abstraction.
//!
//! Every collection the app persists lives under a single string key, so the
//! store only has to move whole strings around. [`KvStore`] is implemented by
//! the durable [`LmdbStore`](crate::lmdb_store::LmdbStore) and by
//! [`MemoryStore`], which keeps everything in process memory.
//!
//! Methods return `impl Future + Send` so implementations can be driven from
//! any tokio runtime and callers stay generic over the backend.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;

use crate::store_error::StoreError;

pub trait KvStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when the key was never written.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Process-local store, used by tests and by hosts that do not need durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
