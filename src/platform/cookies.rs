//! Cookie interface for the route gate.
//!
//! The gate persists the resolved tenant id in a cookie so server-rendered
//! requests see the same tenant scope as client navigations.

use dashmap::DashMap;
use std::time::Duration;

/// Attributes applied when writing a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub path: String,
    pub max_age: Duration,
    pub http_only: bool,
    pub secure: bool,
}

impl CookieAttributes {
    /// Attributes for the tenant cookie: scoped to the whole app,
    /// httpOnly so scripts cannot read it, secure in transit.
    pub fn tenant(max_age: Duration) -> Self {
        Self {
            path: "/".to_string(),
            max_age,
            http_only: true,
            secure: true,
        }
    }
}

/// Read/write string cookies.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str, attrs: CookieAttributes);
    fn remove(&self, name: &str);
}

/// In-memory cookie jar for tests; retains the last-written attributes so
/// tests can assert on them.
#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: DashMap<String, (String, CookieAttributes)>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attributes the named cookie was last written with.
    pub fn attributes(&self, name: &str) -> Option<CookieAttributes> {
        self.cookies.get(name).map(|v| v.1.clone())
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.get(name).map(|v| v.0.clone())
    }

    fn set(&self, name: &str, value: &str, attrs: CookieAttributes) {
        self.cookies
            .insert(name.to_string(), (value.to_string(), attrs));
    }

    fn remove(&self, name: &str) {
        self.cookies.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let jar = MemoryCookieJar::new();
        jar.set(
            "fd_tenant",
            "biz-1",
            CookieAttributes::tenant(Duration::from_secs(60)),
        );
        assert_eq!(jar.get("fd_tenant").as_deref(), Some("biz-1"));

        let attrs = jar.attributes("fd_tenant").unwrap();
        assert!(attrs.http_only);
        assert!(attrs.secure);
        assert_eq!(attrs.path, "/");
    }

    #[test]
    fn test_remove() {
        let jar = MemoryCookieJar::new();
        jar.set(
            "fd_tenant",
            "biz-1",
            CookieAttributes::tenant(Duration::from_secs(60)),
        );
        jar.remove("fd_tenant");
        assert!(jar.get("fd_tenant").is_none());
    }
}
