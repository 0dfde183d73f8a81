//! Argument parsing for cache declarations.
//!
//! A call site lists entity types positionally and may end with an options
//! map. The parser turns that into per-call [`CacheOptions`] plus an ordered
//! list of [`DependencyDeclaration`]s.

use std::time::Duration;

use interlock_core::{EntityType, InterlockResult, Scope, ScopeKey, UsageError};

use super::key::ToTag;

/// One declared dependency: invalidate the artifact when `entity_type`
/// changes, for every instance (`All`) or for the key's id (`ById`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDeclaration {
    pub entity_type: EntityType,
    pub scope: Scope,
}

impl DependencyDeclaration {
    pub fn new(entity_type: EntityType, scope: Scope) -> Self {
        Self { entity_type, scope }
    }

    pub fn all(entity_type: EntityType) -> Self {
        Self::new(entity_type, Scope::All)
    }

    pub fn by_id(entity_type: EntityType) -> Self {
        Self::new(entity_type, Scope::ById)
    }
}

/// Options controlling a single cached call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Free-form tag segment, already rendered by [`ToTag`].
    pub tag: Option<String>,
    /// Default scope segments left out of the key.
    pub ignore: Vec<ScopeKey>,
    /// Per-call expiry; falls back to the configured default.
    pub ttl: Option<Duration>,
    /// When false the call renders without touching the cache.
    pub perform: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            tag: None,
            ignore: Vec::new(),
            ttl: None,
            perform: true,
        }
    }
}

/// An options map as written at the call site, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions {
    tag: Option<String>,
    ignore: Vec<ScopeKey>,
    ttl: Option<Duration>,
    perform: Option<bool>,
    scoped: Vec<(EntityType, String)>,
}

impl RawOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl ToTag) -> Self {
        self.tag = Some(tag.to_tag());
        self
    }

    pub fn ignore(mut self, keys: impl IntoIterator<Item = ScopeKey>) -> Self {
        self.ignore.extend(keys);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn perform(mut self, perform: bool) -> Self {
        self.perform = Some(perform);
        self
    }

    /// Declare a dependency with an explicit scope symbol (`all` or `id`).
    pub fn depends_on(mut self, entity_type: EntityType, scope: impl Into<String>) -> Self {
        self.scoped.push((entity_type, scope.into()));
        self
    }
}

/// One positional argument at a cache call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawArg {
    /// An entity type. `None` stands for an explicit "no dependency".
    Entity(Option<EntityType>),
    /// An options map. Only valid as the last argument.
    Options(RawOptions),
}

impl From<EntityType> for RawArg {
    fn from(entity_type: EntityType) -> Self {
        RawArg::Entity(Some(entity_type))
    }
}

impl From<RawOptions> for RawArg {
    fn from(options: RawOptions) -> Self {
        RawArg::Options(options)
    }
}

/// Split call-site arguments into options and dependency declarations.
///
/// Positional entity types become `All` declarations in order, followed by
/// the scoped pairs from the options map. With nothing declared the
/// `default` entity type is used. Absent entity types are then dropped, so
/// passing a lone `None` opts out of the default.
pub fn parse(
    raw_args: Vec<RawArg>,
    default: Option<EntityType>,
) -> InterlockResult<(CacheOptions, Vec<DependencyDeclaration>)> {
    let mut args = raw_args;
    let raw_options = match args.last() {
        Some(RawArg::Options(_)) => match args.pop() {
            Some(RawArg::Options(options)) => options,
            _ => RawOptions::default(),
        },
        _ => RawOptions::default(),
    };

    let mut pending: Vec<(Option<EntityType>, Scope)> = Vec::with_capacity(args.len());
    for (position, arg) in args.into_iter().enumerate() {
        match arg {
            RawArg::Entity(entity_type) => pending.push((entity_type, Scope::All)),
            RawArg::Options(_) => return Err(UsageError::MisplacedOptions { position }.into()),
        }
    }

    let RawOptions {
        tag,
        ignore,
        ttl,
        perform,
        scoped,
    } = raw_options;

    for (entity_type, symbol) in scoped {
        let scope = Scope::parse(&symbol)?;
        pending.push((Some(entity_type), scope));
    }

    if pending.is_empty() {
        pending.push((default, Scope::All));
    }

    let declarations = pending
        .into_iter()
        .filter_map(|(entity_type, scope)| {
            entity_type.map(|entity_type| DependencyDeclaration::new(entity_type, scope))
        })
        .collect();

    let options = CacheOptions {
        tag,
        ignore,
        ttl,
        perform: perform.unwrap_or(true),
    };

    Ok((options, declarations))
}
