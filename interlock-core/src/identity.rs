//! Identity types for dependency declarations

use crate::DependencyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Name of a kind of mutable object a cached artifact may depend on.
///
/// The name is embedded verbatim in registry keys, so it must be non-empty
/// and free of `:` and whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    /// Create an entity type, validating the name.
    pub fn new(name: impl Into<String>) -> Result<Self, DependencyError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DependencyError::InvalidEntityType {
                name,
                reason: "entity type must not be empty".to_string(),
            });
        }
        if name.contains(':') || name.chars().any(char::is_whitespace) {
            return Err(DependencyError::InvalidEntityType {
                name,
                reason: "entity type must not contain ':' or whitespace".to_string(),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityType {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityType {
    type Error = DependencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}

impl AsRef<str> for EntityType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_entity_type() {
        let post = EntityType::new("Post").unwrap();
        assert_eq!(post.as_str(), "Post");
        assert_eq!(post.to_string(), "Post");
    }

    #[test]
    fn test_rejects_empty_and_separators() {
        assert!(EntityType::new("").is_err());
        assert!(EntityType::new("Blog:Post").is_err());
        assert!(EntityType::new("Blog Post").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let parsed: EntityType = serde_json::from_str("\"Comment\"").unwrap();
        assert_eq!(parsed.as_str(), "Comment");
        assert!(serde_json::from_str::<EntityType>("\"a:b\"").is_err());
    }
}
