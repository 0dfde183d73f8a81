//! Process-local fallback store and the per-request work context.

use std::time::Duration;

use async_trait::async_trait;
use interlock_core::{InterlockConfig, InterlockResult};

use super::memory::MemoryStore;
use super::traits::KeyValueStore;

/// Store consulted before the shared store within one unit of work.
#[derive(Debug, Default)]
pub enum LocalStore {
    /// Reads always miss; writes and deletes are dropped.
    #[default]
    PassThrough,
    /// A bounded in-memory buffer for the current request.
    Memory(MemoryStore),
}

impl LocalStore {
    pub fn memory(capacity: usize) -> Self {
        LocalStore::Memory(MemoryStore::bounded(capacity))
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, LocalStore::Memory(_))
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> InterlockResult<Option<Vec<u8>>> {
        match self {
            LocalStore::PassThrough => Ok(None),
            LocalStore::Memory(store) => store.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> InterlockResult<()> {
        match self {
            LocalStore::PassThrough => Ok(()),
            LocalStore::Memory(store) => store.put(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> InterlockResult<()> {
        match self {
            LocalStore::PassThrough => Ok(()),
            LocalStore::Memory(store) => store.delete(key).await,
        }
    }
}

/// State owned by one unit of work (a request, a job).
///
/// Created explicitly and passed to the invalidator and fragment cache.
#[derive(Debug, Default)]
pub struct WorkContext {
    local: LocalStore,
}

impl WorkContext {
    /// A context with no local buffering.
    pub fn detached() -> Self {
        Self::default()
    }

    /// A context buffering fragments in memory for the current request.
    pub fn request(config: &InterlockConfig) -> Self {
        Self {
            local: LocalStore::memory(config.local_capacity),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn is_buffered(&self) -> bool {
        self.local.is_buffered()
    }
}
