//! Enum types for dependency declarations

use crate::{DependencyError, UsageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SCOPE
// ============================================================================

/// How specific a dependency on an entity type is.
///
/// `All` dominates `ById`: a cache key that depends on every instance of an
/// entity type is never narrowed back to a single instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Any instance of the entity type invalidates the key.
    All,
    /// Only the instance whose id appears in the cache key invalidates it.
    #[serde(rename = "id")]
    ById,
}

impl Scope {
    /// Symbol used in option maps and stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::ById => "id",
        }
    }

    /// Parse a scope symbol. Only `all` and `id` are accepted.
    pub fn parse(s: &str) -> Result<Self, DependencyError> {
        match s {
            "all" => Ok(Scope::All),
            "id" => Ok(Scope::ById),
            _ => Err(DependencyError::InvalidScope {
                scope: s.to_string(),
            }),
        }
    }

    /// True when a dependency already recorded at `self` makes a new
    /// registration at `requested` redundant.
    pub fn covers(&self, requested: Scope) -> bool {
        *self == Scope::All || *self == requested
    }

    /// The broader of two scopes.
    pub fn broaden(self, other: Scope) -> Scope {
        if self == Scope::All || other == Scope::All {
            Scope::All
        } else {
            Scope::ById
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// SCOPE KEYS
// ============================================================================

/// Segments of the default cache-key scope that a caller may ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKey {
    Controller,
    Action,
    Id,
    /// Shorthand for all three.
    All,
}

impl ScopeKey {
    /// The concrete keys, without the `All` shorthand.
    pub const CONCRETE: [ScopeKey; 3] = [ScopeKey::Controller, ScopeKey::Action, ScopeKey::Id];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKey::Controller => "controller",
            ScopeKey::Action => "action",
            ScopeKey::Id => "id",
            ScopeKey::All => "all",
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScopeKey {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "controller" => Ok(ScopeKey::Controller),
            "action" => Ok(ScopeKey::Action),
            "id" => Ok(ScopeKey::Id),
            "all" => Ok(ScopeKey::All),
            _ => Err(UsageError::UnknownScopeKey { key: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_roundtrip() {
        for scope in [Scope::All, Scope::ById] {
            let parsed = Scope::parse(scope.as_str()).unwrap();
            assert_eq!(scope, parsed);
        }
    }

    #[test]
    fn test_scope_rejects_unknown_symbol() {
        let err = "controller".parse::<Scope>().unwrap_err();
        assert_eq!(
            err,
            DependencyError::InvalidScope {
                scope: "controller".to_string()
            }
        );
        assert!("ALL".parse::<Scope>().is_err());
    }

    #[test]
    fn test_all_covers_everything() {
        assert!(Scope::All.covers(Scope::All));
        assert!(Scope::All.covers(Scope::ById));
        assert!(Scope::ById.covers(Scope::ById));
        assert!(!Scope::ById.covers(Scope::All));
    }

    #[test]
    fn test_broaden_never_narrows() {
        assert_eq!(Scope::ById.broaden(Scope::All), Scope::All);
        assert_eq!(Scope::All.broaden(Scope::ById), Scope::All);
        assert_eq!(Scope::ById.broaden(Scope::ById), Scope::ById);
    }

    #[test]
    fn test_scope_serde_symbols() {
        assert_eq!(serde_json::to_string(&Scope::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&Scope::ById).unwrap(), "\"id\"");
        let parsed: Scope = serde_json::from_str("\"id\"").unwrap();
        assert_eq!(parsed, Scope::ById);
    }

    #[test]
    fn test_scope_key_parse() {
        assert_eq!("id".parse::<ScopeKey>().unwrap(), ScopeKey::Id);
        assert!(matches!(
            "format".parse::<ScopeKey>(),
            Err(UsageError::UnknownScopeKey { .. })
        ));
    }
}
