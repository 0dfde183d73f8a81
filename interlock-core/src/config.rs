//! Configuration types
//!
//! Configuration is loaded once at startup and passed explicitly into the
//! registry, the facade and the fragment cache. Nothing reads it from
//! ambient global state.

use crate::{ConfigError, InterlockResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest key the shared store accepts.
pub const KEY_LENGTH_LIMIT: usize = 250;

/// Severity channel that receives diagnostic messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Unknown levels fall back to `debug` instead of failing.
impl From<String> for LogLevel {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Debug,
        }
    }
}

impl From<LogLevel> for String {
    fn from(value: LogLevel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide Interlock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterlockConfig {
    /// Global kill switch. Registration becomes a no-op and fragment reads
    /// fall through to rendering.
    pub disabled: bool,
    /// Default time-to-live for cached fragments, in seconds.
    pub default_ttl_secs: Option<u64>,
    /// Channel for diagnostic messages.
    pub log_level: LogLevel,
    /// First segment of every derived key.
    pub namespace: String,
    /// Deployment/version token, second segment of every derived key.
    pub deployment: String,
    /// Bounded wait for the registry lock, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Maximum cache key length in bytes.
    pub key_length_limit: usize,
    /// Entry limit of the per-request local store.
    pub local_capacity: usize,
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            default_ttl_secs: None,
            log_level: LogLevel::Debug,
            namespace: "interlock".to_string(),
            deployment: "0".to_string(),
            lock_timeout_ms: 5_000,
            key_length_limit: KEY_LENGTH_LIMIT,
            local_capacity: 1024,
        }
    }
}

impl InterlockConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `INTERLOCK_DISABLED`: "true" or "1" disables the subsystem
    /// - `INTERLOCK_TTL_SECS`: default fragment TTL (default: none)
    /// - `INTERLOCK_LOG_LEVEL`: debug, info, warn or error (default: debug)
    /// - `INTERLOCK_NAMESPACE`: key namespace (default: interlock)
    /// - `INTERLOCK_DEPLOYMENT`: deployment token (default: 0)
    /// - `INTERLOCK_LOCK_TIMEOUT_MS`: lock wait (default: 5000)
    /// - `INTERLOCK_KEY_LENGTH_LIMIT`: key limit in bytes (default: 250)
    /// - `INTERLOCK_LOCAL_CAPACITY`: local store entries (default: 1024)
    pub fn from_env() -> InterlockResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> InterlockResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let disabled = lookup("INTERLOCK_DISABLED")
            .map(|s| {
                let s = s.to_lowercase();
                s == "true" || s == "1"
            })
            .unwrap_or(defaults.disabled);

        let default_ttl_secs = match lookup("INTERLOCK_TTL_SECS") {
            Some(raw) => Some(parse_number("INTERLOCK_TTL_SECS", &raw)?),
            None => defaults.default_ttl_secs,
        };

        let log_level = lookup("INTERLOCK_LOG_LEVEL")
            .map(LogLevel::from)
            .unwrap_or(defaults.log_level);

        let namespace = lookup("INTERLOCK_NAMESPACE").unwrap_or(defaults.namespace);
        let deployment = lookup("INTERLOCK_DEPLOYMENT").unwrap_or(defaults.deployment);

        let lock_timeout_ms = match lookup("INTERLOCK_LOCK_TIMEOUT_MS") {
            Some(raw) => parse_number("INTERLOCK_LOCK_TIMEOUT_MS", &raw)?,
            None => defaults.lock_timeout_ms,
        };

        let key_length_limit = match lookup("INTERLOCK_KEY_LENGTH_LIMIT") {
            Some(raw) => parse_number("INTERLOCK_KEY_LENGTH_LIMIT", &raw)?,
            None => defaults.key_length_limit,
        };

        let local_capacity = match lookup("INTERLOCK_LOCAL_CAPACITY") {
            Some(raw) => parse_number("INTERLOCK_LOCAL_CAPACITY", &raw)?,
            None => defaults.local_capacity,
        };

        let config = Self {
            disabled,
            default_ttl_secs,
            log_level,
            namespace,
            deployment,
            lock_timeout_ms,
            key_length_limit,
            local_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document. Missing fields take their
    /// default values.
    pub fn from_toml_str(source: &str) -> InterlockResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Disable or enable the whole subsystem.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Set the default fragment TTL. Sub-second remainders round up to
    /// the next whole second.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
        self.default_ttl_secs = Some(secs);
        self
    }

    /// Set the diagnostic log level.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the deployment token.
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = deployment.into();
        self
    }

    /// Set the lock wait.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the local store capacity.
    pub fn with_local_capacity(mut self, capacity: usize) -> Self {
        self.local_capacity = capacity;
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// `namespace:deployment`, the prefix of every derived key.
    pub fn key_prefix(&self) -> String {
        format!("{}:{}", self.namespace, self.deployment)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - namespace and deployment are non-empty and free of ':' and whitespace
    /// - default_ttl_secs, when set, is > 0
    /// - lock_timeout_ms > 0
    /// - key_length_limit leaves room for at least one byte past the prefix
    /// - local_capacity > 0
    pub fn validate(&self) -> InterlockResult<()> {
        validate_segment("namespace", &self.namespace)?;
        validate_segment("deployment", &self.deployment)?;

        if self.default_ttl_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "default_ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "default_ttl_secs must be positive; omit it for no expiry".to_string(),
            }
            .into());
        }

        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lock_timeout_ms".to_string(),
                value: self.lock_timeout_ms.to_string(),
                reason: "lock_timeout_ms must be positive".to_string(),
            }
            .into());
        }

        let prefix_len = self.key_prefix().len() + 1;
        if self.key_length_limit <= prefix_len {
            return Err(ConfigError::InvalidValue {
                field: "key_length_limit".to_string(),
                value: self.key_length_limit.to_string(),
                reason: format!("key_length_limit must exceed the {} byte key prefix", prefix_len),
            }
            .into());
        }

        if self.local_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "local_capacity".to_string(),
                value: self.local_capacity.to_string(),
                reason: "local_capacity must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn validate_segment(field: &str, value: &str) -> InterlockResult<()> {
    if value.is_empty() {
        return Err(ConfigError::MissingRequired {
            field: field.to_string(),
        }
        .into());
    }
    if value.contains(':') || value.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: format!("{} must not contain ':' or whitespace", field),
        }
        .into());
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> InterlockResult<T> {
    raw.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected a non-negative integer".to_string(),
        }
        .into()
    })
}
