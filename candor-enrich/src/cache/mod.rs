//! Disk-backed TTL response cache
//!
//! Every remote lookup goes through [`CacheStore`] before touching the
//! network. The cache is an optimization: storage failures degrade to a miss
//! or a no-op and are logged, never returned.

pub mod clock;
pub mod key;
pub mod policy;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::CacheKey;
pub use policy::CachePolicy;
pub use store::{CacheEntry, CacheStats, CacheStore};
