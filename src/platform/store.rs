//! Remote data store interface.
//!
//! The hosted backend exposes tenant-scoped tables and RPCs. Callers always
//! pass the tenant scoping column explicitly in filters; the backend may
//! additionally enforce row-level security keyed off the session-bound
//! tenant context established via the `set_tenant_context` RPC.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

/// Errors from the remote data store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Network failure, timeout, or backend unavailability
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Non-success HTTP status from the backend
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The backend rejected the operation (row-level security, revoked key)
    #[error("access denied: {0}")]
    Denied(String),

    /// Unknown RPC name
    #[error("unknown rpc: {0}")]
    UnknownRpc(String),
}

impl StoreError {
    /// Transient failures may be recovered from stale cache data.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Http { status, .. } => *status >= 500,
            StoreError::Denied(_) | StoreError::UnknownRpc(_) => false,
        }
    }
}

/// Query/mutate interface over the hosted backend.
///
/// Filters are JSON objects matched by exact field equality. Rows are JSON
/// objects; table schemas live on the backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Select rows matching every field in `filters`.
    async fn query(&self, table: &str, filters: &Value) -> Result<Vec<Value>, StoreError>;

    /// Insert one row, returning it as stored.
    async fn insert(&self, table: &str, payload: Value) -> Result<Value, StoreError>;

    /// Update rows matching `filters` with the fields of `payload`,
    /// returning the number of rows touched.
    async fn update(&self, table: &str, filters: &Value, payload: Value)
        -> Result<u64, StoreError>;

    /// Delete rows matching `filters`, returning the number removed.
    async fn delete(&self, table: &str, filters: &Value) -> Result<u64, StoreError>;

    /// Invoke a named remote procedure.
    async fn rpc(&self, name: &str, args: Value) -> Result<Value, StoreError>;
}

/// Whether `row` matches every field of the `filters` object.
fn matches(row: &Value, filters: &Value) -> bool {
    match filters.as_object() {
        Some(fields) => fields.iter().all(|(k, v)| row.get(k) == Some(v)),
        // Non-object filters match everything (callers pass {} for "all")
        None => true,
    }
}

/// In-memory store for tests and local development.
///
/// Tables are plain vectors of JSON rows. RPCs are limited to
/// `set_tenant_context`, which records the last scoped tenant so tests can
/// assert the gate established backend scoping.
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Vec<Value>>,
    tenant_context: DashMap<String, String>,
    /// When set, every operation fails with `Unavailable` (outage simulation)
    offline: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with rows.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.insert(table.to_string(), rows);
    }

    /// Toggle outage simulation.
    pub fn set_offline(&self, offline: bool) {
        self.offline
            .store(offline, std::sync::atomic::Ordering::Relaxed);
    }

    /// The tenant id last established via `set_tenant_context`, if any.
    pub fn tenant_context(&self) -> Option<String> {
        self.tenant_context.get("current").map(|v| v.clone())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(std::sync::atomic::Ordering::Relaxed) {
            Err(StoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query(&self, table: &str, filters: &Value) -> Result<Vec<Value>, StoreError> {
        self.check_online()?;
        let rows = self
            .tables
            .get(table)
            .map(|t| t.iter().filter(|r| matches(r, filters)).cloned().collect())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn insert(&self, table: &str, payload: Value) -> Result<Value, StoreError> {
        self.check_online()?;
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(payload.clone());
        Ok(payload)
    }

    async fn update(
        &self,
        table: &str,
        filters: &Value,
        payload: Value,
    ) -> Result<u64, StoreError> {
        self.check_online()?;
        let patch: Map<String, Value> = payload.as_object().cloned().unwrap_or_default();
        let mut touched = 0u64;
        if let Some(mut rows) = self.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches(r, filters)) {
                if let Some(obj) = row.as_object_mut() {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn delete(&self, table: &str, filters: &Value) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut removed = 0u64;
        if let Some(mut rows) = self.tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|r| !matches(r, filters));
            removed = (before - rows.len()) as u64;
        }
        Ok(removed)
    }

    async fn rpc(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        self.check_online()?;
        match name {
            "set_tenant_context" => {
                let business_id = args
                    .get("business_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| StoreError::Http {
                        status: 400,
                        message: "missing business_id".to_string(),
                    })?;
                self.tenant_context
                    .insert("current".to_string(), business_id.to_string());
                Ok(Value::Null)
            }
            other => Err(StoreError::UnknownRpc(other.to_string())),
        }
    }
}
