//! Concurrency tests for dependency registration
//!
//! Many uncoordinated workers register dependencies against one shared
//! store. No registration may be lost, `All` must survive any interleaving
//! with `ById`, and a lock that cannot be acquired must never stop an
//! artifact from being produced.

use std::sync::Arc;
use std::time::Duration;

use interlock_core::{EntityType, InterlockConfig, Scope};
use interlock_storage::{
    CacheKey, DependencyDeclaration, DependencyRegistry, FragmentCache, FragmentSource,
    Invalidator, KeyContext, KeyValueStore, MemoryLock, MemoryStore, WorkContext,
};
use proptest::prelude::*;

type MemoryRegistry = DependencyRegistry<MemoryLock<MemoryStore>>;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn post() -> EntityType {
    EntityType::new("Post").expect("valid entity type")
}

fn shared_registry() -> Arc<MemoryRegistry> {
    Arc::new(
        DependencyRegistry::in_memory(Arc::new(InterlockConfig::default()))
            .expect("default config is valid"),
    )
}

fn show_key(id: usize) -> CacheKey {
    CacheKey::raw(format!("interlock:0:posts:show:{}:untagged", id))
}

// ============================================================================
// CONCURRENT REGISTRATION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_lose_nothing() {
    let registry = shared_registry();
    let workers = 64;

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .register(&[DependencyDeclaration::all(post())], &show_key(i))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let report = handle.await.expect("task panicked").expect("registration failed");
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 0);
    }

    let record = registry.record(&post(), None).await.unwrap();
    assert_eq!(record.len(), workers);
    for i in 0..workers {
        assert_eq!(record.get(&show_key(i)), Some(Scope::All));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_scopes_broaden_to_all() {
    let registry = shared_registry();
    let key = show_key(1);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            let declaration = if i % 2 == 0 {
                DependencyDeclaration::all(post())
            } else {
                DependencyDeclaration::by_id(post())
            };
            tokio::spawn(async move { registry.register(&[declaration], &key).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("registration failed");
    }

    assert_eq!(registry.scope_of(&post(), &key).await.unwrap(), Some(Scope::All));
    let dependents = registry.dependents(&post(), Some(&1u32)).await.unwrap();
    assert_eq!(dependents, vec![key]);
}

// ============================================================================
// END TO END
// ============================================================================

#[tokio::test]
async fn test_register_then_invalidate_drops_artifact() {
    let registry = shared_registry();
    let fragments = FragmentCache::new(Arc::clone(&registry));
    let context = WorkContext::request(registry.config());
    let key_context = KeyContext::new("posts", "index");

    let fragment = fragments
        .fetch(&context, &key_context, vec![post().into()], || async {
            Ok("<ul></ul>".to_string())
        })
        .await
        .unwrap();
    assert_eq!(fragment.key.as_str(), "interlock:0:posts:index:all:untagged");

    let dropped = Invalidator::for_registry(&registry)
        .invalidate_dependents(&context, &registry, &post(), Some(&42u32))
        .await
        .unwrap();
    assert_eq!(dropped, vec![fragment.key.clone()]);
    assert_eq!(registry.store().get(fragment.key.as_str()).await.unwrap(), None);

    let refreshed = fragments
        .fetch(&context, &key_context, vec![post().into()], || async {
            Ok("<ul><li>new</li></ul>".to_string())
        })
        .await
        .unwrap();
    assert_eq!(refreshed.source, FragmentSource::Rendered);
    assert_eq!(refreshed.content, "<ul><li>new</li></ul>");
}

#[tokio::test(start_paused = true)]
async fn test_lock_timeout_still_produces_artifact() {
    let config = Arc::new(InterlockConfig::default().with_lock_timeout(Duration::from_millis(20)));
    let lock = Arc::new(MemoryLock::new(Arc::new(MemoryStore::new()), config.lock_timeout()));
    let registry = Arc::new(
        DependencyRegistry::new(Arc::clone(&lock), Arc::clone(&config)).expect("valid config"),
    );
    let fragments = FragmentCache::new(Arc::clone(&registry));

    let held = lock.acquire("interlock:0:dependency:Post").await.unwrap();

    let fragment = fragments
        .fetch(
            &WorkContext::detached(),
            &KeyContext::new("posts", "index"),
            vec![post().into()],
            || async { Ok("<ul></ul>".to_string()) },
        )
        .await
        .expect("lock timeout must not fail the fragment");

    assert_eq!(fragment.source, FragmentSource::Rendered);
    assert_eq!(fragment.registration.map(|r| r.skipped), Some(1));
    assert!(registry.record(&post(), None).await.unwrap().is_empty());

    held.release();
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the interleaving, every key registered by a concurrent
    /// worker ends up in the record, at the broadest scope it was given.
    #[test]
    fn prop_concurrent_registration_is_lossless(
        plan in prop::collection::vec((0usize..6, any::<bool>()), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let registry = shared_registry();

            let handles: Vec<_> = plan
                .iter()
                .map(|(id, all)| {
                    let registry = Arc::clone(&registry);
                    let declaration = if *all {
                        DependencyDeclaration::all(post())
                    } else {
                        DependencyDeclaration::by_id(post())
                    };
                    let key = show_key(*id);
                    tokio::spawn(async move { registry.register(&[declaration], &key).await })
                })
                .collect();

            for handle in handles {
                handle.await.expect("task panicked").expect("registration failed");
            }

            for (id, _) in &plan {
                let any_all = plan.iter().any(|(other, all)| other == id && *all);
                let expected = if any_all { Scope::All } else { Scope::ById };
                let scope = registry.scope_of(&post(), &show_key(*id)).await.unwrap();
                assert_eq!(scope, Some(expected));
            }
        });
    }
}
