//! Interlock Core - Types, Configuration and Errors
//!
//! Pure data types shared by the registry and the stores. No I/O lives
//! here; everything that touches a store is in `interlock-storage`.

pub mod config;
pub mod enums;
pub mod error;
pub mod identity;
pub mod lock;
pub mod telemetry;

pub use config::{InterlockConfig, LogLevel, KEY_LENGTH_LIMIT};
pub use enums::{Scope, ScopeKey};
pub use error::{
    ConfigError, DependencyError, FragmentError, InterlockError, InterlockResult, LockError,
    StoreError, UsageError,
};
pub use identity::{EntityType, Timestamp};
pub use lock::{Lease, LeaseData};
