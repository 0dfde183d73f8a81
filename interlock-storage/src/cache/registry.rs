//! Dependency registry.
//!
//! For every entity type the registry keeps records in the shared store
//! mapping cache keys to the scope at which they depend on that type.
//! `All` dependencies live in one record per entity type; `ById`
//! dependencies live in one record per (entity type, id).
//!
//! Writers never coordinate except through the named lock. The common case
//! (the dependency is already recorded) is answered from a plain read and
//! takes no lock at all.
//!
//! # Reading records
//!
//! A key registered at `All` is not written again into the per-id record
//! when it is later registered `ById`; the all-instances entry already
//! covers it. Consumers must therefore read both records for an id, which
//! is what [`DependencyRegistry::dependents`] and
//! [`DependencyRegistry::scope_of`] do. The per-id record alone is not the
//! full dependent set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use interlock_core::{
    telemetry, EntityType, InterlockConfig, InterlockResult, Scope, StoreError,
};
use serde::{Deserialize, Serialize};

use super::key::{CacheKey, KeyCodec, RegistryKey, ToTag, ID_SEGMENT};
use super::memory::{MemoryLock, MemoryStore};
use super::options::DependencyDeclaration;
use super::traits::{DistributedLock, KeyValueStore};

// ============================================================================
// RECORD
// ============================================================================

/// Mapping from cache key to dependency scope, stored as one blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryRecord {
    entries: BTreeMap<CacheKey, Scope>,
}

impl RegistryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a stored record. `key` is only used for error reporting.
    pub fn decode(key: &str, bytes: &[u8]) -> InterlockResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn encode(&self, key: &str) -> InterlockResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn get(&self, cache_key: &CacheKey) -> Option<Scope> {
        self.entries.get(cache_key).copied()
    }

    /// Record `cache_key` at `scope`. An existing `All` entry is never
    /// narrowed. Returns true if the record changed.
    pub fn merge(&mut self, cache_key: CacheKey, scope: Scope) -> bool {
        match self.entries.get_mut(&cache_key) {
            Some(existing) => {
                let merged = existing.broaden(scope);
                let changed = merged != *existing;
                *existing = merged;
                changed
            }
            None => {
                self.entries.insert(cache_key, scope);
                true
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, Scope)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Outcome of one [`DependencyRegistry::register`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Declarations written under the lock.
    pub written: usize,
    /// Declarations already covered by an existing entry.
    pub covered: usize,
    /// Declarations abandoned because the lock could not be acquired.
    pub skipped: usize,
    /// True when the subsystem is disabled and nothing was attempted.
    pub disabled: bool,
}

/// Records and queries dependencies between cache keys and entity types.
///
/// Records are read from and written to the store owned by the lock, so
/// lock-free reads and locked writes always see the same values.
pub struct DependencyRegistry<L: DistributedLock> {
    lock: Arc<L>,
    codec: KeyCodec,
    config: Arc<InterlockConfig>,
}

impl DependencyRegistry<MemoryLock<MemoryStore>> {
    /// Registry over a fresh unbounded in-memory store.
    pub fn in_memory(config: Arc<InterlockConfig>) -> InterlockResult<Self> {
        let store = Arc::new(MemoryStore::new());
        let lock = Arc::new(MemoryLock::new(store, config.lock_timeout()));
        Self::new(lock, config)
    }
}

impl<L: DistributedLock> DependencyRegistry<L> {
    /// Build a registry over `lock` and the store it guards. Fails if the
    /// configuration is invalid.
    pub fn new(lock: Arc<L>, config: Arc<InterlockConfig>) -> InterlockResult<Self> {
        config.validate()?;
        let codec = KeyCodec::new(&config);
        Ok(Self {
            lock,
            codec,
            config,
        })
    }

    pub fn store(&self) -> &Arc<L::Store> {
        self.lock.store()
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn config(&self) -> &InterlockConfig {
        &self.config
    }

    /// Record that `cache_key` depends on each declared entity type.
    ///
    /// Validation and store failures propagate. A lock timeout abandons
    /// only the declaration it hit and is reported in `skipped`.
    pub async fn register(
        &self,
        declarations: &[DependencyDeclaration],
        cache_key: &CacheKey,
    ) -> InterlockResult<RegistrationReport> {
        let mut report = RegistrationReport::default();
        if self.config.disabled {
            report.disabled = true;
            return Ok(report);
        }

        for declaration in declarations {
            let DependencyDeclaration { entity_type, scope } = declaration;
            let registry_key = self
                .codec
                .build_registry_key(entity_type, *scope, cache_key)?;

            let existing = self.existing_scope(entity_type, &registry_key, cache_key).await?;
            if existing.is_some_and(|existing| existing.covers(*scope)) {
                report.covered += 1;
                continue;
            }

            match self.write_entry(&registry_key, cache_key, *scope).await {
                Ok(_) => {
                    report.written += 1;
                    telemetry::say(
                        self.config.log_level,
                        cache_key.as_str(),
                        &format!("registered a dependency on {} -> {}.", entity_type, scope),
                    );
                }
                Err(e) if e.is_soft() => {
                    report.skipped += 1;
                    tracing::warn!(
                        registry_key = %registry_key,
                        cache_key = %cache_key,
                        entity_type = %entity_type,
                        scope = %scope,
                        error = %e,
                        "Skipped dependency registration"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// The record an invalidation of `entity_type` consults: the
    /// all-instances record when `id` is `None`, else the record for `id`.
    pub async fn record(
        &self,
        entity_type: &EntityType,
        id: Option<&dyn ToTag>,
    ) -> InterlockResult<RegistryRecord> {
        let registry_key = self.codec.registry_key_for(entity_type, id);
        self.read_record(&registry_key).await
    }

    /// Every cache key to drop when `entity_type` changes.
    ///
    /// Always includes the all-instances record. With an `id`, the
    /// record for that id is included too.
    pub async fn dependents(
        &self,
        entity_type: &EntityType,
        id: Option<&dyn ToTag>,
    ) -> InterlockResult<Vec<CacheKey>> {
        let mut keys: BTreeSet<CacheKey> = self
            .record(entity_type, None)
            .await?
            .keys()
            .cloned()
            .collect();

        if id.is_some() {
            keys.extend(self.record(entity_type, id).await?.keys().cloned());
        }

        Ok(keys.into_iter().collect())
    }

    /// Effective scope at which `cache_key` depends on `entity_type`, if
    /// at all.
    pub async fn scope_of(
        &self,
        entity_type: &EntityType,
        cache_key: &CacheKey,
    ) -> InterlockResult<Option<Scope>> {
        let all_key = self.codec.registry_key_for(entity_type, None);
        let mut scope = self.read_record(&all_key).await?.get(cache_key);

        if cache_key.field(ID_SEGMENT).is_some() {
            let id_key = self
                .codec
                .build_registry_key(entity_type, Scope::ById, cache_key)?;
            if let Some(by_id) = self.read_record(&id_key).await?.get(cache_key) {
                scope = Some(scope.map_or(by_id, |s| s.broaden(by_id)));
            }
        }

        Ok(scope)
    }

    async fn read_record(&self, registry_key: &RegistryKey) -> InterlockResult<RegistryRecord> {
        match self.store().get(registry_key.as_str()).await? {
            Some(bytes) => RegistryRecord::decode(registry_key.as_str(), &bytes),
            None => Ok(RegistryRecord::new()),
        }
    }

    /// Scope already recorded for `cache_key` in the target record. A
    /// `ById` target also honors an entry in the all-instances record.
    async fn existing_scope(
        &self,
        entity_type: &EntityType,
        registry_key: &RegistryKey,
        cache_key: &CacheKey,
    ) -> InterlockResult<Option<Scope>> {
        let existing = self.read_record(registry_key).await?.get(cache_key);
        if existing == Some(Scope::All) {
            return Ok(existing);
        }

        let all_key = self.codec.registry_key_for(entity_type, None);
        if all_key == *registry_key {
            return Ok(existing);
        }

        match self.read_record(&all_key).await?.get(cache_key) {
            Some(Scope::All) => Ok(Some(Scope::All)),
            _ => Ok(existing),
        }
    }

    /// Merge one entry under the lock, against the record as it is now.
    async fn write_entry(
        &self,
        registry_key: &RegistryKey,
        cache_key: &CacheKey,
        scope: Scope,
    ) -> InterlockResult<bool> {
        let name = registry_key.to_string();
        let cache_key = cache_key.clone();
        let record_name = name.clone();

        self.lock
            .with_lock(&name, move |current| {
                let mut record = match current {
                    Some(bytes) => RegistryRecord::decode(&record_name, &bytes)?,
                    None => RegistryRecord::new(),
                };
                let changed = record.merge(cache_key, scope);
                Ok((record.encode(&record_name)?, changed))
            })
            .await
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn scope_strategy() -> impl Strategy<Value = Scope> {
        prop_oneof![Just(Scope::All), Just(Scope::ById)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Once a key is recorded at `All` it stays `All`, whatever order
        /// the registrations arrive in.
        #[test]
        fn prop_merge_all_dominates(scopes in prop::collection::vec(scope_strategy(), 1..20)) {
            let key = CacheKey::raw("interlock:0:posts:show:7:sidebar");
            let mut record = RegistryRecord::new();
            for scope in &scopes {
                record.merge(key.clone(), *scope);
            }

            let expected = if scopes.contains(&Scope::All) { Scope::All } else { Scope::ById };
            prop_assert_eq!(record.get(&key), Some(expected));
            prop_assert_eq!(record.len(), 1);
        }

        /// Merging is order independent across many keys.
        #[test]
        fn prop_merge_order_independent(
            entries in prop::collection::vec((0u8..8, scope_strategy()), 0..40),
        ) {
            let mut forward = RegistryRecord::new();
            for (k, scope) in &entries {
                forward.merge(CacheKey::raw(format!("k{}", k)), *scope);
            }
            let mut backward = RegistryRecord::new();
            for (k, scope) in entries.iter().rev() {
                backward.merge(CacheKey::raw(format!("k{}", k)), *scope);
            }
            prop_assert_eq!(forward, backward);
        }
    }
}
