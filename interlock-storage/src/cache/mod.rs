//! Dependency-tracked fragment caching over a shared key-value store.
//!
//! Cached artifacts declare the entity types they depend on. The
//! [`DependencyRegistry`] records those dependencies in the shared store so
//! that a change to an entity can drop every artifact built from it.
//!
//! # Concurrency
//!
//! Many workers register dependencies at once with nothing shared but the
//! [`KeyValueStore`] and the [`DistributedLock`]. Registrations that are
//! already recorded take no lock. New ones merge under a lock named after
//! the registry key, against the record as re-read under that lock, so no
//! concurrent registration is lost. A lock timeout skips that one
//! declaration and is logged, it never fails the artifact.
//!
//! # Example
//!
//! ```ignore
//! let config = Arc::new(InterlockConfig::from_env()?);
//! let registry = Arc::new(DependencyRegistry::in_memory(Arc::clone(&config))?);
//! let fragments = FragmentCache::new(Arc::clone(&registry));
//!
//! let context = WorkContext::request(&config);
//! let key_context = KeyContext::new("posts", "show").with_id(7);
//! let fragment = fragments
//!     .fetch(&context, &key_context, vec![post.into()], || async {
//!         Ok(render_post().await)
//!     })
//!     .await?;
//!
//! // Later, when post 7 changes:
//! Invalidator::for_registry(&registry)
//!     .invalidate_dependents(&context, &registry, &post, Some(&7))
//!     .await?;
//! ```

pub mod facade;
pub mod fragment;
pub mod key;
pub mod local;
pub mod memory;
pub mod options;
pub mod registry;
pub mod traits;

pub use facade::Invalidator;
pub use fragment::{Fragment, FragmentCache, FragmentSource};
pub use key::{CacheKey, KeyCodec, KeyContext, RegistryKey, ToTag, ID_SEGMENT};
pub use local::{LocalStore, WorkContext};
pub use memory::{LockGuard, MemoryLock, MemoryStore};
pub use options::{parse, CacheOptions, DependencyDeclaration, RawArg, RawOptions};
pub use registry::{DependencyRegistry, RegistrationReport, RegistryRecord};
pub use traits::{CacheStats, DistributedLock, KeyValueStore};
