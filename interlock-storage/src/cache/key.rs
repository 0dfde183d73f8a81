//! Cache key and registry key derivation.
//!
//! A canonical cache key has six `:`-separated segments:
//!
//! ```text
//! namespace:deployment:controller:action:id:tag
//! ```
//!
//! Registry keys are derived from an entity type and, for `ById`
//! dependencies, the id segment of the cache key:
//!
//! ```text
//! namespace:deployment:dependency:EntityType[:id]
//! ```
//!
//! # Truncation
//!
//! Keys longer than the configured limit are cut to the limit. There is no
//! hash suffix, so two long keys that share a prefix of the limit's length
//! collide. Changing this would change every stored key, so the behavior is
//! kept and a diagnostic is logged whenever it happens.

use std::borrow::Borrow;
use std::fmt;

use interlock_core::{
    telemetry, EntityType, InterlockConfig, InterlockResult, LogLevel, Scope, ScopeKey,
    UsageError,
};
use serde::{Deserialize, Serialize};

/// Zero-based position of the id segment in a canonical cache key.
pub const ID_SEGMENT: usize = 4;

/// Segment substituted for an ignored controller or action.
const ANY: &str = "any";

/// Id segment used when no id applies.
const ALL_IDS: &str = "all";

// ============================================================================
// KEY TYPES
// ============================================================================

/// Store key of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a key built outside the codec. No validation is applied.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `n`th `:`-separated segment, if present.
    pub fn field(&self, n: usize) -> Option<&str> {
        self.0.split(':').nth(n)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Store key of one registry record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey(String);

impl RegistryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TAGS
// ============================================================================

/// Conversion to a key-safe tag segment.
///
/// Tags never contain `:`, so the segment positions of a key stay fixed.
/// Composite values render order-independently.
pub trait ToTag {
    fn to_tag(&self) -> String;
}

fn escape_fragment(s: &str) -> String {
    if s.is_empty() {
        "empty_string".to_string()
    } else {
        s.replace(':', "-")
    }
}

impl ToTag for str {
    fn to_tag(&self) -> String {
        escape_fragment(self)
    }
}

impl ToTag for String {
    fn to_tag(&self) -> String {
        escape_fragment(self)
    }
}

impl<T: ToTag + ?Sized> ToTag for &T {
    fn to_tag(&self) -> String {
        (**self).to_tag()
    }
}

impl<T: ToTag> ToTag for Option<T> {
    fn to_tag(&self) -> String {
        match self {
            Some(value) => value.to_tag(),
            None => "untagged".to_string(),
        }
    }
}

impl<T: ToTag> ToTag for [T] {
    fn to_tag(&self) -> String {
        if self.is_empty() {
            return "untagged".to_string();
        }
        let mut parts: Vec<String> = self.iter().map(ToTag::to_tag).collect();
        parts.sort();
        parts.join(",")
    }
}

impl<T: ToTag> ToTag for Vec<T> {
    fn to_tag(&self) -> String {
        self.as_slice().to_tag()
    }
}

macro_rules! impl_to_tag_display {
    ($($ty:ty),*) => {
        $(
            impl ToTag for $ty {
                fn to_tag(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_to_tag_display!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool);

// ============================================================================
// KEY CONTEXT
// ============================================================================

/// The identifying scope of the current unit of work, from which default
/// cache keys are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyContext {
    pub controller: String,
    pub action: String,
    pub id: Option<String>,
}

impl KeyContext {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl ToTag) -> Self {
        self.id = Some(id.to_tag());
        self
    }
}

// ============================================================================
// CODEC
// ============================================================================

/// Builds cache keys and registry keys under one namespace.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
    limit: usize,
    log_level: LogLevel,
}

impl KeyCodec {
    pub fn new(config: &InterlockConfig) -> Self {
        Self {
            prefix: config.key_prefix(),
            limit: config.key_length_limit,
            log_level: config.log_level,
        }
    }

    /// `namespace:deployment`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Build a cache key for an explicit context.
    ///
    /// `id` defaults to `all`. The key is truncated to the length limit and
    /// stripped of whitespace.
    pub fn build_cache_key(
        &self,
        controller: &str,
        action: &str,
        id: Option<&dyn ToTag>,
        tag: &dyn ToTag,
    ) -> InterlockResult<CacheKey> {
        if controller.is_empty() || action.is_empty() {
            return Err(UsageError::MissingScope.into());
        }

        let id = id.map(|id| id.to_tag()).unwrap_or_else(|| ALL_IDS.to_string());
        let mut key = format!(
            "{}:{}:{}:{}:{}",
            self.prefix,
            controller,
            action,
            id,
            tag.to_tag()
        );

        if key.len() > self.limit {
            let old_key = key.clone();
            let mut end = self.limit;
            while !key.is_char_boundary(end) {
                end -= 1;
            }
            key.truncate(end);
            telemetry::say(self.log_level, &old_key, &format!("truncated to {}", key));
        }

        key.retain(|c| !c.is_whitespace());
        Ok(CacheKey(key))
    }

    /// Build a cache key from the unit of work's context, honoring ignored
    /// scope segments.
    ///
    /// Ignoring the controller or action substitutes `any`; ignoring the id
    /// substitutes `all`. Ignoring every segment requires a tag.
    pub fn key_for(
        &self,
        context: &KeyContext,
        ignore: &[ScopeKey],
        tag: Option<&dyn ToTag>,
    ) -> InterlockResult<CacheKey> {
        let ignores = |key: ScopeKey| ignore.contains(&ScopeKey::All) || ignore.contains(&key);

        if ScopeKey::CONCRETE.iter().all(|key| ignores(*key)) && tag.is_none() {
            return Err(UsageError::MissingTag.into());
        }

        let controller = if ignores(ScopeKey::Controller) {
            ANY
        } else {
            context.controller.as_str()
        };
        let action = if ignores(ScopeKey::Action) {
            ANY
        } else {
            context.action.as_str()
        };
        let id = if ignores(ScopeKey::Id) {
            None
        } else {
            context.id.as_ref()
        };

        let untagged: Option<&str> = None;
        self.build_cache_key(
            controller,
            action,
            id.map(|id| id as &dyn ToTag),
            tag.unwrap_or(&untagged),
        )
    }

    /// Registry key for a dependency of `cache_key` on `entity_type`.
    ///
    /// `ById` embeds the id segment of the cache key; `All` omits it.
    pub fn build_registry_key(
        &self,
        entity_type: &EntityType,
        scope: Scope,
        cache_key: &CacheKey,
    ) -> InterlockResult<RegistryKey> {
        match scope {
            Scope::All => Ok(self.registry_key_for(entity_type, None)),
            Scope::ById => {
                let id = cache_key
                    .field(ID_SEGMENT)
                    .ok_or_else(|| UsageError::MissingIdSegment {
                        key: cache_key.to_string(),
                        position: ID_SEGMENT,
                    })?;
                Ok(self.registry_key_with_segment(entity_type, Some(id)))
            }
        }
    }

    /// Registry key as seen from the invalidation side: `None` for the
    /// all-instances record, or the id of one changed instance.
    pub fn registry_key_for(&self, entity_type: &EntityType, id: Option<&dyn ToTag>) -> RegistryKey {
        let id = id.map(|id| id.to_tag());
        self.registry_key_with_segment(entity_type, id.as_deref())
    }

    fn registry_key_with_segment(&self, entity_type: &EntityType, id: Option<&str>) -> RegistryKey {
        match id {
            Some(id) => RegistryKey(format!("{}:dependency:{}:{}", self.prefix, entity_type, id)),
            None => RegistryKey(format!("{}:dependency:{}", self.prefix, entity_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interlock_core::InterlockError;
    use std::sync::{Arc, Mutex};

    fn codec() -> KeyCodec {
        KeyCodec::new(&InterlockConfig::default())
    }

    fn post() -> EntityType {
        EntityType::new("Post").unwrap()
    }

    #[test]
    fn test_build_cache_key_canonical_form() {
        let key = codec()
            .build_cache_key("posts", "show", Some(&"7"), &"sidebar")
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:posts:show:7:sidebar");
        assert_eq!(key.field(ID_SEGMENT), Some("7"));
    }

    #[test]
    fn test_build_cache_key_defaults_id_to_all() {
        let key = codec()
            .build_cache_key("posts", "index", None, &None::<String>)
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:posts:index:all:untagged");
    }

    #[test]
    fn test_build_cache_key_requires_controller_and_action() {
        let err = codec()
            .build_cache_key("", "show", None, &"t")
            .unwrap_err();
        assert!(matches!(err, InterlockError::Usage(UsageError::MissingScope)));
        assert!(codec().build_cache_key("posts", "", None, &"t").is_err());
    }

    #[test]
    fn test_tags_escape_separators() {
        let key = codec()
            .build_cache_key("posts", "show", Some(&"a:b"), &"x:y:z")
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:posts:show:a-b:x-y-z");
        assert_eq!(key.field(ID_SEGMENT), Some("a-b"));
    }

    #[test]
    fn test_composite_tags_are_order_independent() {
        let a = vec!["zeta", "alpha", "mid"];
        let b = vec!["mid", "zeta", "alpha"];
        assert_eq!(a.to_tag(), "alpha,mid,zeta");
        assert_eq!(a.to_tag(), b.to_tag());
        assert_eq!(Vec::<u32>::new().to_tag(), "untagged");
    }

    #[test]
    fn test_scalar_tags() {
        assert_eq!(42u64.to_tag(), "42");
        assert_eq!((-3i32).to_tag(), "-3");
        assert_eq!("".to_tag(), "empty_string");
        assert_eq!(Some("x").to_tag(), "x");
        assert_eq!(None::<&str>.to_tag(), "untagged");
    }

    #[test]
    fn test_whitespace_is_stripped() {
        let key = codec()
            .build_cache_key("posts", "show", Some(&"7"), &"side bar\n")
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:posts:show:7:sidebar");
    }

    #[test]
    fn test_long_keys_truncate_to_limit() {
        let long_tag = "t".repeat(400);
        let key = codec()
            .build_cache_key("posts", "show", Some(&"7"), &long_tag)
            .unwrap();
        assert_eq!(key.as_str().len(), 250);
        assert!(key.as_str().starts_with("interlock:0:posts:show:7:ttt"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // Each 'é' is two bytes and the prefix is 25 bytes, so byte 250
        // falls inside a character.
        let long_tag = "é".repeat(200);
        let key = codec()
            .build_cache_key("posts", "show", Some(&"7"), &long_tag)
            .unwrap();
        assert_eq!(key.as_str().len(), 249);
    }

    /// Writer that appends formatted log lines to a shared buffer.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_truncation_is_logged_with_new_key() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();

        let key = tracing::subscriber::with_default(subscriber, || {
            codec()
                .build_cache_key("posts", "show", Some(&"7"), &"t".repeat(400))
                .unwrap()
        });

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("** fragment interlock:0:posts:show:7:ttt"));
        assert!(output.contains(&format!("truncated to {}", key)));
    }

    #[test]
    fn test_truncation_collides_on_shared_prefix() {
        let base = "t".repeat(300);
        let a = codec()
            .build_cache_key("posts", "show", None, &format!("{}a", base))
            .unwrap();
        let b = codec()
            .build_cache_key("posts", "show", None, &format!("{}b", base))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_registry_key_for_all_scope() {
        let cache_key = CacheKey::raw("interlock:0:posts:show:7:sidebar");
        let key = codec()
            .build_registry_key(&post(), Scope::All, &cache_key)
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:dependency:Post");
    }

    #[test]
    fn test_registry_key_for_id_scope_embeds_id_segment() {
        let cache_key = CacheKey::raw("interlock:0:posts:show:7:sidebar");
        let key = codec()
            .build_registry_key(&post(), Scope::ById, &cache_key)
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:dependency:Post:7");
        assert_eq!(key, codec().registry_key_for(&post(), Some(&7u32)));
    }

    #[test]
    fn test_registry_key_for_id_scope_requires_id_segment() {
        let cache_key = CacheKey::raw("custom:key");
        let err = codec()
            .build_registry_key(&post(), Scope::ById, &cache_key)
            .unwrap_err();
        assert!(matches!(
            err,
            InterlockError::Usage(UsageError::MissingIdSegment { position: 4, .. })
        ));
        // All-scope registration works for any key.
        assert!(codec()
            .build_registry_key(&post(), Scope::All, &cache_key)
            .is_ok());
    }

    #[test]
    fn test_key_for_uses_context() {
        let context = KeyContext::new("posts", "show").with_id(7u32);
        let key = codec().key_for(&context, &[], Some(&"sidebar")).unwrap();
        assert_eq!(key.as_str(), "interlock:0:posts:show:7:sidebar");
    }

    #[test]
    fn test_key_for_ignored_segments() {
        let context = KeyContext::new("posts", "show").with_id(7u32);
        let key = codec()
            .key_for(&context, &[ScopeKey::Action, ScopeKey::Id], None)
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:posts:any:all:untagged");
    }

    #[test]
    fn test_key_for_ignoring_everything_requires_tag() {
        let context = KeyContext::new("posts", "show");
        let err = codec().key_for(&context, &[ScopeKey::All], None).unwrap_err();
        assert!(matches!(err, InterlockError::Usage(UsageError::MissingTag)));

        let key = codec()
            .key_for(&context, &[ScopeKey::All], Some(&"sidebar"))
            .unwrap();
        assert_eq!(key.as_str(), "interlock:0:any:any:all:sidebar");
    }

    #[test]
    fn test_deployment_token_namespaces_keys() {
        let config = InterlockConfig::default().with_deployment("v2");
        let key = KeyCodec::new(&config)
            .build_cache_key("posts", "show", Some(&"7"), &"sidebar")
            .unwrap();
        assert_eq!(key.as_str(), "interlock:v2:posts:show:7:sidebar");
    }
}
