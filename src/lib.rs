//! FrontDesk Core - tenant-scoped caching and access resolution
//!
//! The client-side core of the FrontDesk multi-tenant booking platform.
//! Persistence, authentication, and row-level security live on the hosted
//! backend; this crate owns the two pieces with real design content:
//!
//! - **Cache layer**: an in-memory TTL cache with coalesced read-through,
//!   a tenant-scoped cache-key registry, a stale-tolerant persisted cache
//!   for slow-changing data, and a query wrapper with debounce, prefetch,
//!   and optimistic mutation.
//! - **Tenant layer**: the business resolver (which businesses the current
//!   identity may operate against, and which one is current) and the route
//!   access gate that re-verifies membership server-side on every gated
//!   navigation.
//!
//! Backend collaborators are consumed through the adapter traits in
//! [`platform`]; in-memory implementations are provided for tests.

pub mod cache;
pub mod config;
pub mod logging;
pub mod platform;
pub mod tenant;
pub mod types;

pub use config::CoreConfig;
pub use types::{CoreError, Result, Session, Tenant, TenantRole, TenantStatus};
