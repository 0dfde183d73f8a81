//! Interlock Storage - Dependency Registry and Invalidation
//!
//! Key derivation, dependency registration and invalidation over a shared
//! key-value store. Configuration, errors and logging live in
//! `interlock-core`.

pub mod cache;

// Re-export cache types for callers
pub use cache::{
    CacheKey, CacheOptions, CacheStats, DependencyDeclaration, DependencyRegistry,
    DistributedLock, Fragment, FragmentCache, FragmentSource, Invalidator, KeyCodec, KeyContext,
    KeyValueStore, LocalStore, LockGuard, MemoryLock, MemoryStore, RawArg, RawOptions,
    RegistrationReport, RegistryKey, RegistryRecord, ToTag, WorkContext, ID_SEGMENT,
};
