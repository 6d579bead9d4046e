//! Runtime configuration for the core.
//!
//! Defaults are compiled in; deployments override through environment
//! variables the same way the cache layer of the backend gateway does.

use std::time::Duration;

/// Configuration for caches, the resolver, and the route gate.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How often the in-memory cache sweeps expired entries (default: 60s)
    pub sweep_interval: Duration,

    /// Default debounce window for filter-typing query paths (default: 300ms)
    pub debounce_window: Duration,

    /// TTL for the persisted membership/access cache (default: 5 minutes)
    pub access_cache_ttl: Duration,

    /// Cookie name carrying the resolved tenant id across navigations
    pub tenant_cookie_name: String,

    /// Max-age of the tenant cookie (default: 30 days)
    pub tenant_cookie_max_age: Duration,

    /// Key under which the resolver persists the current tenant id
    pub tenant_storage_key: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            debounce_window: Duration::from_millis(300),
            access_cache_ttl: Duration::from_secs(5 * 60),
            tenant_cookie_name: "fd_tenant".to_string(),
            tenant_cookie_max_age: Duration::from_secs(30 * 24 * 60 * 60),
            tenant_storage_key: "frontdesk.current_tenant".to_string(),
        }
    }
}

impl CoreConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CACHE_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.sweep_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("QUERY_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.debounce_window = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("ACCESS_CACHE_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.access_cache_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("TENANT_COOKIE_NAME") {
            if !val.is_empty() {
                config.tenant_cookie_name = val;
            }
        }

        if let Ok(val) = std::env::var("TENANT_COOKIE_MAX_AGE_DAYS") {
            if let Ok(days) = val.parse::<u64>() {
                config.tenant_cookie_max_age = Duration::from_secs(days * 24 * 60 * 60);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.tenant_cookie_name, "fd_tenant");
        assert_eq!(
            config.tenant_cookie_max_age,
            Duration::from_secs(30 * 24 * 60 * 60)
        );
    }
}
