//! In-process store and lock implementations.
//!
//! `MemoryStore` stands in for the shared store in single-process
//! deployments and tests, and doubles as the bounded per-request local
//! store. `MemoryLock` layers named locks over any [`KeyValueStore`].
//!
//! # Thread Safety
//!
//! The store guards its map with a `std::sync::Mutex` that is never held
//! across an `.await`. Named locks are `tokio::sync::Mutex`es, one per
//! name, so writers contend only when they touch the same registry key.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use interlock_core::{InterlockResult, Lease, LockError, StoreError};
use lru::LruCache;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

use super::traits::{CacheStats, DistributedLock, KeyValueStore};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug)]
struct StoreInner {
    entries: LruCache<String, Entry>,
    stats: CacheStats,
}

/// In-memory key-value store with optional LRU bound and per-entry TTL.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::with_entries(LruCache::unbounded())
    }

    /// Create a store holding at most `capacity` entries, evicting the
    /// least recently used. A capacity of zero is treated as one.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = NonZeroUsize::MIN.saturating_add(capacity.saturating_sub(1));
        Self::with_entries(LruCache::new(capacity))
    }

    fn with_entries(entries: LruCache<String, Entry>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                entries,
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock_inner(&self) -> InterlockResult<std::sync::MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| {
            StoreError::Backend {
                reason: "memory store mutex poisoned".to_string(),
            }
            .into()
        })
    }

    /// Number of live and not-yet-collected entries.
    pub fn len(&self) -> usize {
        self.lock_inner().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of usage statistics.
    pub fn stats(&self) -> CacheStats {
        self.lock_inner()
            .map(|inner| inner.stats.clone())
            .unwrap_or_default()
    }

    /// Drop every entry.
    pub fn clear(&self) -> InterlockResult<()> {
        let mut guard = self.lock_inner()?;
        let inner = &mut *guard;
        inner.entries.clear();
        inner.stats.entry_count = 0;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> InterlockResult<Option<Vec<u8>>> {
        let mut guard = self.lock_inner()?;
        let inner = &mut *guard;
        let now = Instant::now();

        // Some(None) marks an expired entry.
        let found = inner
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));

        match found {
            Some(Some(value)) => {
                inner.stats.hits += 1;
                Ok(Some(value))
            }
            Some(None) => {
                inner.entries.pop(key);
                inner.stats.expirations += 1;
                inner.stats.entry_count = inner.entries.len() as u64;
                inner.stats.misses += 1;
                Ok(None)
            }
            None => {
                inner.stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> InterlockResult<()> {
        let mut guard = self.lock_inner()?;
        let inner = &mut *guard;
        let entry = Entry {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        };

        if let Some((evicted, _)) = inner.entries.push(key.to_string(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
            }
        }
        inner.stats.entry_count = inner.entries.len() as u64;
        Ok(())
    }

    async fn delete(&self, key: &str) -> InterlockResult<()> {
        let mut guard = self.lock_inner()?;
        let inner = &mut *guard;
        inner.entries.pop(key);
        inner.stats.entry_count = inner.entries.len() as u64;
        Ok(())
    }
}

// ============================================================================
// NAMED LOCKS
// ============================================================================

type SlotTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Drop the slot for `name` once nobody holds or waits on it.
fn prune(slots: &SlotTable, name: &str) {
    if let Ok(mut slots) = slots.lock() {
        if slots.get(name).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(name);
        }
    }
}

/// Holding of one named lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    lease: Lease,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<SlotTable>,
}

impl LockGuard {
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Release explicitly, warning if the holder overran its lease.
    pub fn release(self) {
        let data = self.lease.data();
        let now = Utc::now();
        if data.is_expired(now) {
            let overrun = LockError::LeaseOverrun {
                name: data.name.clone(),
                held: data.held_for(now),
            };
            tracing::warn!(lease_id = %data.lease_id, error = %overrun, "Lock released after lease expiry");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.slots, self.lease.name());
    }
}

/// Named locks over a [`KeyValueStore`], local to this process.
///
/// Acquisition waits at most `timeout`. Leases last `lease_ttl`; a holder
/// that overruns its lease is reported when it releases. A name's slot
/// lives only while someone holds or waits on it.
pub struct MemoryLock<S: KeyValueStore> {
    store: Arc<S>,
    timeout: Duration,
    lease_ttl: Duration,
    slots: Arc<SlotTable>,
}

impl<S: KeyValueStore> MemoryLock<S> {
    /// Create locks over `store`. The lease lasts twice the wait timeout.
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            lease_ttl: timeout.saturating_mul(2),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of names currently held or waited on.
    pub fn slot_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn slot(&self, name: &str) -> InterlockResult<Arc<tokio::sync::Mutex<()>>> {
        let mut slots = self.slots.lock().map_err(|_| StoreError::Backend {
            reason: "lock table mutex poisoned".to_string(),
        })?;
        Ok(Arc::clone(slots.entry(name.to_string()).or_default()))
    }

    /// Acquire the lock named `name`, waiting at most the configured timeout.
    pub async fn acquire(&self, name: &str) -> InterlockResult<LockGuard> {
        let slot = self.slot(name)?;
        let acquired = tokio::time::timeout(self.timeout, slot.lock_owned()).await;

        let guard = match acquired {
            Ok(guard) => guard,
            Err(_) => {
                prune(&self.slots, name);
                return Err(LockError::AcquisitionTimeout {
                    name: name.to_string(),
                    waited: self.timeout,
                }
                .into());
            }
        };

        Ok(LockGuard {
            lease: Lease::acquire(name, Utc::now(), self.lease_ttl),
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        })
    }
}

#[async_trait]
impl<S: KeyValueStore> DistributedLock for MemoryLock<S> {
    type Store = S;

    fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn with_lock<F, R>(&self, name: &str, update: F) -> InterlockResult<R>
    where
        F: FnOnce(Option<Vec<u8>>) -> InterlockResult<(Vec<u8>, R)> + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.acquire(name).await?;
        tracing::trace!(name, lease_id = %guard.lease().lease_id(), "Lock acquired");

        let current = self.store.get(name).await?;
        let (value, output) = update(current)?;
        self.store.put(name, value, None).await?;

        guard.release();
        Ok(output)
    }
}
