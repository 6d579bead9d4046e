//! Tenant access resolution and route gating.
//!
//! The [`resolver`] answers "which businesses can this identity operate
//! against, and which one is current" for UI convenience; the [`gate`]
//! makes the authoritative per-navigation access decision against the
//! backend. The two deliberately do not share cached state: a stale
//! client-side tenant list must never translate into data access.

pub mod gate;
pub mod resolver;

pub use gate::{GateDecision, RouteGate};
pub use resolver::{spawn_session_watch, BusinessResolver, ResolverState};
