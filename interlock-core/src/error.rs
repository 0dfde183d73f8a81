//! Error types for Interlock operations

use std::time::Duration;
use thiserror::Error;

/// Invalid dependency declarations. Always a caller bug, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("{scope:?} is not a valid scope")]
    InvalidScope { scope: String },

    #[error("Invalid entity type {name:?}: {reason}")]
    InvalidEntityType { name: String, reason: String },
}

/// Malformed calls into the key codec or option parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Both controller and action must be specified")]
    MissingScope,

    #[error("You must specify a tag if you are ignoring the entire default scope")]
    MissingTag,

    #[error("Cache key {key:?} has no id segment at position {position}")]
    MissingIdSegment { key: String, position: usize },

    #[error("Options must be the last argument, found at position {position}")]
    MisplacedOptions { position: usize },

    #[error("Unknown scope key {key:?}")]
    UnknownScopeKey { key: String },
}

/// Invalid global configuration. Fails fast at setup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to initialize logging: {reason}")]
    Logging { reason: String },
}

/// Distributed lock failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("Timed out after {waited:?} acquiring lock {name}")]
    AcquisitionTimeout { name: String, waited: Duration },

    #[error("Lock {name} was held past its lease ({held:?})")]
    LeaseOverrun { name: String, held: Duration },
}

/// Detected invariant violations in cached content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("Cached fragment at {key} is not valid UTF-8")]
    InvalidEncoding { key: String },
}

/// Shared store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Master error type for all Interlock errors.
#[derive(Debug, Clone, Error)]
pub enum InterlockError {
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lock acquisition error: {0}")]
    Lock(#[from] LockError),

    #[error("Fragment consistency error: {0}")]
    Fragment(#[from] FragmentError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl InterlockError {
    /// Soft failures are logged and swallowed by the registry.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Lock(_))
    }

    /// Errors caused by a malformed call rather than by the environment.
    pub fn is_caller_bug(&self) -> bool {
        matches!(self, Self::Dependency(_) | Self::Usage(_))
    }
}

/// Result type alias for Interlock operations.
pub type InterlockResult<T> = Result<T, InterlockError>;
