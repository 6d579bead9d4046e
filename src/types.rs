//! Shared domain types and the crate error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::platform::kv::StorageError;
use crate::platform::store::StoreError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the core.
///
/// Transient store failures are recoverable through stale cache data;
/// everything else surfaces to the caller for the UI to render or redirect.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Remote data store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No authenticated session where one is required
    #[error("no active session")]
    NoSession,

    /// Client-side persistence failure (quota, serialization)
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// Whether this error class may succeed on retry (network/5xx style).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Store(e) if e.is_transient())
    }
}

/// Membership role within a business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Staff,
    Manager,
    Admin,
    Owner,
}

impl fmt::Display for TenantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantRole::Staff => write!(f, "staff"),
            TenantRole::Manager => write!(f, "manager"),
            TenantRole::Admin => write!(f, "admin"),
            TenantRole::Owner => write!(f, "owner"),
        }
    }
}

/// Lifecycle status of a business.
///
/// Anything other than `Active` or `Trial` means onboarding is incomplete
/// and the gate routes to onboarding instead of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Trial,
    Pending,
    Inactive,
}

impl TenantStatus {
    /// Whether a business in this status may reach the dashboard.
    pub fn is_operational(&self) -> bool {
        matches!(self, TenantStatus::Active | TenantStatus::Trial)
    }
}

/// A business the current identity has membership in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Business id (the tenant scoping column on every backend table)
    pub id: String,
    /// Display name
    pub name: String,
    /// The identity's role within this business
    pub role: TenantRole,
    /// Business lifecycle status
    pub status: TenantStatus,
    /// Optional logo URL for the tenant switcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// The observed slice of the backend identity session.
///
/// The session itself is owned by the external auth service; the core only
/// reads who is logged in and reacts to validity transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
}
