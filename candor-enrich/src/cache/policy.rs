//! Expiry policy
//!
//! The policy is a value handed to the store at construction. Stores derived
//! with [`CacheStore::with_policy`](super::CacheStore::with_policy) share the
//! same directory but evaluate expiry under their own policy, so there is no
//! process-wide switch to race on.

use candor_common::config::{CachePolicyName, CacheSettings};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Entries expire once `now - created_at >= ttl`
    Ttl(Duration),
    /// Every entry is valid regardless of age
    NeverExpire,
    /// Every entry is treated as expired
    AlwaysExpired,
}

impl CachePolicy {
    /// Default TTL: one week
    pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Saturates rather than wrapping for absurd hour counts
    pub fn ttl_hours(hours: u64) -> Self {
        CachePolicy::Ttl(Duration::from_secs(hours.saturating_mul(60 * 60)))
    }

    /// Returns true if an entry created at `created_at` is expired at `now`
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            CachePolicy::NeverExpire => false,
            CachePolicy::AlwaysExpired => true,
            CachePolicy::Ttl(ttl) => {
                // Entries stamped in the future (clock skew) count as fresh
                let age = match (now - created_at).to_std() {
                    Ok(age) => age,
                    Err(_) => return false,
                };
                age >= *ttl
            }
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Ttl(Self::DEFAULT_TTL)
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Ttl(ttl) => write!(f, "ttl({}s)", ttl.as_secs()),
            CachePolicy::NeverExpire => f.write_str("never_expire"),
            CachePolicy::AlwaysExpired => f.write_str("always_expired"),
        }
    }
}

impl From<&CacheSettings> for CachePolicy {
    fn from(settings: &CacheSettings) -> Self {
        match settings.policy {
            CachePolicyName::Ttl => CachePolicy::ttl_hours(settings.ttl_hours),
            CachePolicyName::NeverExpire => CachePolicy::NeverExpire,
            CachePolicyName::AlwaysExpired => CachePolicy::AlwaysExpired,
        }
    }
}
