//! Lock leases for the registry's named locks.
//!
//! A lease records one holding of a named lock. Releasing consumes it and
//! hands back its data, so a lease cannot be released twice.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// LEASE DATA
// ============================================================================

/// Data for one holding of a named lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseData {
    pub lease_id: Uuid,
    /// Lock name, the registry key being written.
    pub name: String,
    pub acquired_at: Timestamp,
    /// After this instant the holder is considered to have overrun its lease.
    pub expires_at: Timestamp,
}

impl LeaseData {
    /// Check if the lease has expired based on current time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// How long the lease has been held at `now`.
    pub fn held_for(&self, now: Timestamp) -> Duration {
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

// ============================================================================
// LEASE
// ============================================================================

/// One holding of a named lock.
#[derive(Debug)]
pub struct Lease {
    data: LeaseData,
}

impl Lease {
    /// Start a lease on `name` at `now`, valid for `ttl`.
    pub fn acquire(name: impl Into<String>, now: Timestamp, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Lease {
            data: LeaseData {
                lease_id: Uuid::now_v7(),
                name: name.into(),
                acquired_at: now,
                expires_at: now.checked_add_signed(ttl).unwrap_or(now),
            },
        }
    }

    pub fn data(&self) -> &LeaseData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn lease_id(&self) -> Uuid {
        self.data.lease_id
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.data.is_expired(now)
    }

    /// Release the lease and return its data. Consumes the lease.
    pub fn release(self) -> LeaseData {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_acquire_sets_expiry() {
        let now = Utc::now();
        let lease = Lease::acquire("interlock:0:dependency:Post", now, Duration::from_secs(5));
        assert_eq!(lease.name(), "interlock:0:dependency:Post");
        assert_eq!(lease.data().acquired_at, now);
        assert_eq!(lease.data().expires_at, now + chrono::Duration::seconds(5));
        assert!(!lease.is_expired(now));
        assert!(lease.is_expired(now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_release_consumes() {
        let lease = Lease::acquire("k", Utc::now(), Duration::from_secs(1));
        let id = lease.lease_id();
        let data = lease.release();
        assert_eq!(data.lease_id, id);
    }

    #[test]
    fn test_held_for() {
        let now = Utc::now();
        let data = Lease::acquire("k", now, Duration::from_secs(1)).release();
        assert_eq!(
            data.held_for(now + chrono::Duration::milliseconds(1500)),
            Duration::from_millis(1500)
        );
        assert_eq!(data.held_for(now - chrono::Duration::seconds(1)), Duration::ZERO);
    }

    #[test]
    fn test_distinct_lease_ids() {
        let now = Utc::now();
        let a = Lease::acquire("k", now, Duration::from_secs(1));
        let b = Lease::acquire("k", now, Duration::from_secs(1));
        assert_ne!(a.lease_id(), b.lease_id());
    }
}
