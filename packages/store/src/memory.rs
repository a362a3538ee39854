//! Volatile cache backend for sandboxed environments.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{cache_key, ModuleStore, StoreError};

/// In-memory module cache.
///
/// Scoped to the process: nothing persists across restarts. Keys go through
/// the same sanitization as [`crate::FsStore`] so the two backends are
/// interchangeable for a given set of logical keys.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ModuleStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let key = cache_key(key)?;
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let key = cache_key(key)?;
        tracing::debug!(%key, len = bytes.len(), "cached module in memory");
        self.entries.write().await.insert(key, bytes);
        Ok(())
    }
}
