//! Invalidation entry points.

use std::sync::Arc;

use interlock_core::{telemetry, EntityType, InterlockResult, LogLevel};

use super::key::{CacheKey, ToTag};
use super::local::WorkContext;
use super::registry::DependencyRegistry;
use super::traits::{DistributedLock, KeyValueStore};

/// Drops cached artifacts from the local and shared stores.
pub struct Invalidator<S: KeyValueStore> {
    store: Arc<S>,
    log_level: LogLevel,
}

impl<S: KeyValueStore> Invalidator<S> {
    pub fn new(store: Arc<S>, log_level: LogLevel) -> Self {
        Self { store, log_level }
    }

    /// Invalidator sharing the registry's store and log channel.
    pub fn for_registry<L>(registry: &DependencyRegistry<L>) -> Self
    where
        L: DistributedLock<Store = S>,
    {
        Self::new(Arc::clone(registry.store()), registry.config().log_level)
    }

    /// Delete `key` from the context's local store and from the shared
    /// store. Deleting an absent key is not an error.
    pub async fn invalidate(&self, context: &WorkContext, key: &CacheKey) -> InterlockResult<()> {
        context.local().delete(key.as_str()).await?;
        self.store.delete(key.as_str()).await?;
        telemetry::say(self.log_level, key.as_str(), "invalidated");
        Ok(())
    }

    /// Invalidate every artifact that depends on `entity_type`, or on the
    /// instance `id` of it. Returns the keys that were dropped.
    ///
    /// Every dependent key is attempted. If any delete fails the first
    /// error is returned after the rest have been tried, and each failed
    /// key is logged.
    ///
    /// Registry records are left in place; a later invalidation deletes
    /// the same keys again, which is harmless.
    pub async fn invalidate_dependents<L: DistributedLock>(
        &self,
        context: &WorkContext,
        registry: &DependencyRegistry<L>,
        entity_type: &EntityType,
        id: Option<&dyn ToTag>,
    ) -> InterlockResult<Vec<CacheKey>> {
        let keys = registry.dependents(entity_type, id).await?;
        let mut first_error = None;
        let mut failed = 0usize;

        for key in &keys {
            if let Err(e) = self.invalidate(context, key).await {
                failed += 1;
                tracing::warn!(
                    cache_key = %key,
                    entity_type = %entity_type,
                    error = %e,
                    "Failed to invalidate dependent fragment"
                );
                first_error.get_or_insert(e);
            }
        }

        tracing::debug!(
            entity_type = %entity_type,
            count = keys.len(),
            failed,
            "Invalidated dependent fragments"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(keys),
        }
    }
}
