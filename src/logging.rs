//! Logging infrastructure.
//!
//! Structured tracing setup shared by host applications and tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `default_level` applies when `RUST_LOG` is not set. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
