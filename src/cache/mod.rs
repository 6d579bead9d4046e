//! Tenant-scoped caching layer.
//!
//! - [`ttl`]: in-memory TTL cache with coalesced read-through and a
//!   periodic sweep task
//! - [`keys`]: deterministic tenant-scoped cache keys per resource family
//! - [`persistent`]: stale-tolerant persisted cache for slow-changing data
//! - [`query`]: cached query wrapper with debounce, prefetch, and
//!   optimistic mutation

pub mod keys;
pub mod persistent;
pub mod query;
pub mod ttl;

pub use keys::KeySpec;
pub use persistent::StaleTolerantCache;
pub use query::{QueryClient, QueryMetrics, QueryState};
pub use ttl::{spawn_sweep_task, CacheStatsSnapshot, TtlCache};
