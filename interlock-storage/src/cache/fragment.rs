//! Read-through fragment cache with dependency registration.
//!
//! ```text
//! fetch(context, key_context, args, render)
//!   -> parse args, build key
//!   -> disabled / perform=false? render uncached
//!   -> register dependencies
//!   -> local hit? shared hit? else render and write both
//! ```

use std::future::Future;
use std::sync::Arc;

use interlock_core::{FragmentError, InterlockResult};

use super::key::{CacheKey, KeyContext, ToTag};
use super::local::WorkContext;
use super::options::{self, RawArg};
use super::registry::{DependencyRegistry, RegistrationReport};
use super::traits::{DistributedLock, KeyValueStore};

/// Where a fragment's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentSource {
    /// Found in the work context's local store.
    Local,
    /// Found in the shared store.
    Shared,
    /// Rendered on a miss and written back.
    Rendered,
    /// Rendered with caching bypassed.
    Uncached,
}

/// A produced fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub key: CacheKey,
    pub content: String,
    pub source: FragmentSource,
    /// `None` when caching was bypassed.
    pub registration: Option<RegistrationReport>,
}

/// Caches rendered fragments and records what they depend on.
pub struct FragmentCache<L: DistributedLock> {
    registry: Arc<DependencyRegistry<L>>,
}

impl<L: DistributedLock> FragmentCache<L> {
    pub fn new(registry: Arc<DependencyRegistry<L>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DependencyRegistry<L> {
        &self.registry
    }

    /// Return the cached fragment for `key_context`, rendering and storing
    /// it on a miss.
    ///
    /// Lock timeouts during registration never fail the call. Cached bytes
    /// that are not UTF-8 fail with a fragment consistency error.
    pub async fn fetch<F, Fut>(
        &self,
        context: &WorkContext,
        key_context: &KeyContext,
        raw_args: Vec<RawArg>,
        render: F,
    ) -> InterlockResult<Fragment>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = InterlockResult<String>>,
    {
        let config = self.registry.config();
        let (options, dependencies) = options::parse(raw_args, None)?;
        let key = self.registry.codec().key_for(
            key_context,
            &options.ignore,
            options.tag.as_ref().map(|tag| tag as &dyn ToTag),
        )?;

        if !options.perform || config.disabled {
            let content = render().await?;
            return Ok(Fragment {
                key,
                content,
                source: FragmentSource::Uncached,
                registration: None,
            });
        }

        let registration = self.registry.register(&dependencies, &key).await?;

        if let Some(bytes) = context.local().get(key.as_str()).await? {
            return Ok(Fragment {
                content: decode(&key, bytes)?,
                key,
                source: FragmentSource::Local,
                registration: Some(registration),
            });
        }

        let ttl = options.ttl.or_else(|| config.default_ttl());
        let store = self.registry.store();

        if let Some(bytes) = store.get(key.as_str()).await? {
            let content = decode(&key, bytes)?;
            context
                .local()
                .put(key.as_str(), content.clone().into_bytes(), ttl)
                .await?;
            return Ok(Fragment {
                key,
                content,
                source: FragmentSource::Shared,
                registration: Some(registration),
            });
        }

        let content = render().await?;
        store
            .put(key.as_str(), content.clone().into_bytes(), ttl)
            .await?;
        context
            .local()
            .put(key.as_str(), content.clone().into_bytes(), ttl)
            .await?;

        tracing::debug!(key = %key, bytes = content.len(), "Rendered fragment");
        Ok(Fragment {
            key,
            content,
            source: FragmentSource::Rendered,
            registration: Some(registration),
        })
    }
}

fn decode(key: &CacheKey, bytes: Vec<u8>) -> InterlockResult<String> {
    String::from_utf8(bytes).map_err(|_| {
        FragmentError::InvalidEncoding {
            key: key.to_string(),
        }
        .into()
    })
}
