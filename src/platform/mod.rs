//! Adapter traits for the hosted backend platform.
//!
//! The backend (persistence, auth, row-level security) is an external
//! collaborator; this module defines the seams the core consumes it
//! through, plus in-memory implementations used by tests.

pub mod cookies;
pub mod kv;
pub mod session;
pub mod store;

pub use cookies::{CookieAttributes, CookieJar, MemoryCookieJar};
pub use kv::{KeyValueStore, MemoryKv, StorageError};
pub use session::{SessionService, StaticSessionService};
pub use store::{MemoryStore, RemoteStore, StoreError};
