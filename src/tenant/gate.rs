//! Route access gate.
//!
//! Per-navigation decision: session check, tenant resolution, membership
//! verification, backend tenant-context scoping, cookie persistence.
//!
//! The membership check here queries the backend directly on every gated
//! navigation. It never consults the resolver's cached list: tenant-list
//! staleness must never translate into unauthorized data access, so the
//! authoritative check stays separate from the UI-convenience cache.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::CoreConfig;
use crate::platform::cookies::{CookieAttributes, CookieJar};
use crate::platform::kv::KeyValueStore;
use crate::platform::session::SessionService;
use crate::platform::store::RemoteStore;
use crate::tenant::resolver::MEMBERSHIP_TABLE;
use crate::types::{CoreError, Result, TenantStatus};

/// Outcome of one gated navigation attempt. Every variant except
/// `Granted` maps to a redirect in the host application.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Render the requested view under this tenant
    Granted { tenant_id: String },
    /// Membership confirmed, but onboarding is incomplete
    OnboardingRequired { tenant_id: String },
    /// No authenticated session: redirect to login
    NoSession,
    /// No tenant id in the path, cookie, or persisted state:
    /// redirect to tenant selection
    TenantMissing,
    /// The identity holds no active membership in the requested tenant.
    /// Terminal - authorization failures are never retried.
    AccessDenied { tenant_id: String },
    /// Unexpected failure: redirect to the generic error view
    GateError { message: String },
}

/// Gate evaluated on every tenant-scoped navigation.
pub struct RouteGate {
    store: Arc<dyn RemoteStore>,
    sessions: Arc<dyn SessionService>,
    cookies: Arc<dyn CookieJar>,
    kv: Arc<dyn KeyValueStore>,
    config: CoreConfig,
}

impl RouteGate {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionService>,
        cookies: Arc<dyn CookieJar>,
        kv: Arc<dyn KeyValueStore>,
        config: CoreConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            cookies,
            kv,
            config,
        }
    }

    /// Decide whether the navigation may proceed.
    ///
    /// `path_tenant` is the tenant id segment from the requested URL, when
    /// the route carries one. Unexpected failures collapse into
    /// [`GateDecision::GateError`]; this function never panics or errors.
    pub async fn check_access(&self, path_tenant: Option<&str>) -> GateDecision {
        match self.evaluate(path_tenant).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, "route gate failed");
                GateDecision::GateError {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn evaluate(&self, path_tenant: Option<&str>) -> Result<GateDecision> {
        let Some(session) = self.sessions.get_session().await else {
            debug!("gate: no session");
            return Ok(GateDecision::NoSession);
        };

        let Some(tenant_id) = self.resolve_target_tenant(path_tenant) else {
            debug!(user_id = %session.user_id, "gate: no tenant id resolvable");
            return Ok(GateDecision::TenantMissing);
        };

        // Authoritative membership check against the backend; a client
        // cache claiming membership carries no weight here.
        let rows = self
            .store
            .query(
                MEMBERSHIP_TABLE,
                &json!({
                    "user_id": session.user_id,
                    "business_id": tenant_id,
                    "status": "active",
                }),
            )
            .await?;

        let Some(membership) = rows.first() else {
            warn!(
                user_id = %session.user_id,
                tenant_id = %tenant_id,
                "gate: no active membership, access denied"
            );
            return Ok(GateDecision::AccessDenied { tenant_id });
        };

        // Establish server-side row-level-security scoping before any
        // tenant-scoped query runs.
        self.store
            .rpc("set_tenant_context", json!({ "business_id": tenant_id }))
            .await?;

        self.persist_tenant(&tenant_id);

        let status: TenantStatus = membership
            .get("business_status")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| CoreError::NotFound("business_status".to_string()))?;

        if !status.is_operational() {
            info!(tenant_id = %tenant_id, ?status, "gate: onboarding incomplete");
            return Ok(GateDecision::OnboardingRequired { tenant_id });
        }

        debug!(tenant_id = %tenant_id, "gate: access granted");
        Ok(GateDecision::Granted { tenant_id })
    }

    /// Target tenant precedence: URL path segment, then the tenant cookie,
    /// then the resolver's persisted selection.
    fn resolve_target_tenant(&self, path_tenant: Option<&str>) -> Option<String> {
        if let Some(id) = path_tenant {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        if let Some(id) = self.cookies.get(&self.config.tenant_cookie_name) {
            return Some(id);
        }
        self.kv.get_item(&self.config.tenant_storage_key)
    }

    fn persist_tenant(&self, tenant_id: &str) {
        self.cookies.set(
            &self.config.tenant_cookie_name,
            tenant_id,
            CookieAttributes::tenant(self.config.tenant_cookie_max_age),
        );
        if let Err(e) = self.kv.set_item(&self.config.tenant_storage_key, tenant_id) {
            debug!(tenant_id, error = %e, "tenant persist skipped");
        }
    }
}
