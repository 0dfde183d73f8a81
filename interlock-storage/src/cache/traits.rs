//! Shared store and distributed lock boundaries.
//!
//! The registry coordinates concurrent, uncoordinated writers using only
//! these two traits. No transactions and no compare-and-swap are assumed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use interlock_core::InterlockResult;

/// Key-value store boundary.
///
/// Implementations must be thread-safe. Values are opaque bytes; the
/// registry stores its records as serialized blobs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> InterlockResult<Option<Vec<u8>>>;

    /// Store `value` at `key`. A `ttl` of `None` means no expiry.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> InterlockResult<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> InterlockResult<()>;
}

/// Named mutual exclusion over values in a shared store.
///
/// # Contract
///
/// `with_lock` acquires exclusive access scoped to `name`, waiting at most
/// the implementation's configured timeout. While the lock is held it reads
/// the value *currently* stored at `name` and hands it to `update`. Callers
/// must merge into that value rather than into anything they read before
/// acquiring the lock. Whatever `update` returns as bytes is persisted at
/// `name` before the lock is released; the second tuple element is handed
/// back to the caller.
///
/// A timeout fails with `LockError::AcquisitionTimeout` and `update` is not
/// called.
///
/// The lock owns the store it guards. Readers outside the lock go through
/// [`DistributedLock::store`] so they see the same values the lock writes.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    type Store: KeyValueStore;

    /// The store whose values this lock guards.
    fn store(&self) -> &Arc<Self::Store>;

    async fn with_lock<F, R>(&self, name: &str, update: F) -> InterlockResult<R>
    where
        F: FnOnce(Option<Vec<u8>>) -> InterlockResult<(Vec<u8>, R)> + Send + 'static,
        R: Send + 'static;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads that found a live value.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of entries dropped for capacity.
    pub evictions: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
