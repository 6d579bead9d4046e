//! Cache key registry.
//!
//! One builder per logical resource family, each mapping
//! `(tenant_id, params)` to a deterministic key and TTL. The tenant id is
//! always part of the key: two tenants must never share a cache slot, which
//! is an isolation invariant, not just a performance concern.
//!
//! Filter objects are canonicalized (recursively sorted object keys) before
//! hashing so structurally identical filters that differ only in key
//! insertion order land on the same slot.

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Resource TTL policy. Dashboard numbers move often; access data rarely.
const DASHBOARD_TTL: Duration = Duration::from_secs(2 * 60);
const LIST_TTL: Duration = Duration::from_secs(60);
const APPOINTMENTS_TTL: Duration = Duration::from_secs(30);
const SERVICES_TTL: Duration = Duration::from_secs(10 * 60);
const ACCESS_TTL: Duration = Duration::from_secs(10 * 60);

/// A cache key together with the TTL its resource family prescribes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub key: String,
    pub ttl: Duration,
}

/// Serialize a JSON value with object keys recursively sorted.
///
/// `serde_json` may preserve insertion order depending on enabled features,
/// so sorting here is what guarantees fingerprint stability.
fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String((*key).clone()).to_string());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Short deterministic fingerprint of a filter object.
pub fn fingerprint(filters: &Value) -> String {
    if filters.is_null() || filters.as_object().is_some_and(|o| o.is_empty()) {
        return "all".to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(filters).as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

fn key(tenant_id: &str, resource: &str, suffix: &str) -> String {
    format!("tenant:{tenant_id}:{resource}:{suffix}")
}

/// Dashboard metric rollups (appointment counts, revenue, occupancy).
pub fn dashboard_metrics(tenant_id: &str, period: &str) -> KeySpec {
    KeySpec {
        key: key(tenant_id, "dashboard", period),
        ttl: DASHBOARD_TTL,
    }
}

/// Filtered client list.
pub fn client_list(tenant_id: &str, filters: &Value) -> KeySpec {
    KeySpec {
        key: key(tenant_id, "clients", &fingerprint(filters)),
        ttl: LIST_TTL,
    }
}

/// Filtered professional list.
pub fn professional_list(tenant_id: &str, filters: &Value) -> KeySpec {
    KeySpec {
        key: key(tenant_id, "professionals", &fingerprint(filters)),
        ttl: LIST_TTL,
    }
}

/// Service catalog. Changes rarely, cached longer.
pub fn service_list(tenant_id: &str) -> KeySpec {
    KeySpec {
        key: key(tenant_id, "services", "all"),
        ttl: SERVICES_TTL,
    }
}

/// Appointments within a date range (ISO dates). Short TTL: the schedule
/// is the most contended view in the app.
pub fn appointment_list(tenant_id: &str, from: &str, to: &str) -> KeySpec {
    KeySpec {
        key: key(tenant_id, "appointments", &format!("{from}..{to}")),
        ttl: APPOINTMENTS_TTL,
    }
}

/// A user's role and permissions within a tenant.
pub fn user_access(tenant_id: &str, user_id: &str) -> KeySpec {
    KeySpec {
        key: key(tenant_id, "access", user_id),
        ttl: ACCESS_TTL,
    }
}

/// Pattern matching every cached key of one resource family for one tenant,
/// for mutation-driven invalidation of derived keys.
pub fn tenant_invalidation_pattern(tenant_id: &str, resource: &str) -> Regex {
    // Tenant ids and resource names are our own identifiers, but escape
    // anyway so an odd id cannot widen the match.
    let pattern = format!(
        "^tenant:{}:{}:",
        regex::escape(tenant_id),
        regex::escape(resource)
    );
    Regex::new(&pattern).expect("escaped pattern is always valid")
}
