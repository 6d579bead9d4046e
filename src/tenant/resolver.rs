//! Business resolver.
//!
//! Determines which businesses the authenticated identity holds active
//! membership in, which one is current, and persists that choice. State is
//! broadcast over a watch channel so the tenant switcher and feature hooks
//! re-render on changes.
//!
//! Overlapping fetches carry a generation token; only the response matching
//! the latest-issued call commits, so a slow early response can never
//! overwrite a newer one.

use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::persistent::StaleTolerantCache;
use crate::config::CoreConfig;
use crate::platform::cookies::CookieJar;
use crate::platform::kv::KeyValueStore;
use crate::platform::session::SessionService;
use crate::platform::store::RemoteStore;
use crate::types::{Result, Tenant, TenantRole, TenantStatus};

/// Membership table queried for the identity's businesses.
pub const MEMBERSHIP_TABLE: &str = "business_members";

/// Resolver lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverState {
    Uninitialized,
    Loading,
    Ready {
        current: Option<Tenant>,
        available: Vec<Tenant>,
    },
    Error(String),
}

impl ResolverState {
    pub fn current(&self) -> Option<&Tenant> {
        match self {
            ResolverState::Ready { current, .. } => current.as_ref(),
            _ => None,
        }
    }

    pub fn available(&self) -> &[Tenant] {
        match self {
            ResolverState::Ready { available, .. } => available,
            _ => &[],
        }
    }
}

/// A membership row joined with its business, as the backend returns it.
#[derive(Debug, Deserialize)]
struct MembershipRow {
    business_id: String,
    role: TenantRole,
    business_name: String,
    business_status: TenantStatus,
    #[serde(default)]
    logo_url: Option<String>,
}

impl From<MembershipRow> for Tenant {
    fn from(row: MembershipRow) -> Self {
        Tenant {
            id: row.business_id,
            name: row.business_name,
            role: row.role,
            status: row.business_status,
            logo_url: row.logo_url,
        }
    }
}

/// Resolves and tracks the current business for the active identity.
pub struct BusinessResolver {
    store: Arc<dyn RemoteStore>,
    sessions: Arc<dyn SessionService>,
    access_cache: StaleTolerantCache,
    kv: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn CookieJar>,
    config: CoreConfig,
    generation: AtomicU64,
    state_tx: watch::Sender<ResolverState>,
    // Keeps the channel open so sends store the value even with no subscribers
    _state_rx: watch::Receiver<ResolverState>,
}

impl BusinessResolver {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionService>,
        kv: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn CookieJar>,
        config: CoreConfig,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(ResolverState::Uninitialized);
        Self {
            store,
            sessions,
            access_cache: StaleTolerantCache::new(kv.clone()),
            kv,
            cookies,
            config,
            generation: AtomicU64::new(0),
            state_tx,
            _state_rx,
        }
    }

    /// Subscribe to resolver state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ResolverState {
        self.state_tx.borrow().clone()
    }

    /// The current tenant, when resolved.
    pub fn current_tenant(&self) -> Option<Tenant> {
        self.state_tx.borrow().current().cloned()
    }

    /// Resolve memberships for the active identity and re-validate the
    /// current selection.
    ///
    /// Without a session this resets to `Ready(None, [])` - the persisted
    /// selection is not trusted until an identity re-validates it. The
    /// membership query may be served from the stale-tolerant cache; use
    /// [`Self::refresh_businesses`] after membership mutations.
    pub async fn fetch_businesses(&self) -> Result<()> {
        self.resolve(false).await
    }

    /// Re-fetch memberships bypassing the persisted cache, e.g. after an
    /// invite acceptance.
    pub async fn refresh_businesses(&self) -> Result<()> {
        self.resolve(true).await
    }

    async fn resolve(&self, force_refresh: bool) -> Result<()> {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.commit(token, ResolverState::Loading);

        let Some(session) = self.sessions.get_session().await else {
            self.commit(
                token,
                ResolverState::Ready {
                    current: None,
                    available: Vec::new(),
                },
            );
            return Ok(());
        };

        let available = match self.load_memberships(&session.user_id, force_refresh).await {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!(user_id = %session.user_id, error = %e, "membership fetch failed");
                self.commit(token, ResolverState::Error(e.to_string()));
                return Err(e);
            }
        };

        let current = self.select_current(&available);
        let committed = self.commit(
            token,
            ResolverState::Ready {
                current: current.clone(),
                available: available.clone(),
            },
        );
        // A discarded stale response must not touch persistence either
        if committed {
            if let Some(tenant) = &current {
                self.persist_selection(&tenant.id);
            }
            info!(
                user_id = %session.user_id,
                available = available.len(),
                current = current.as_ref().map(|t| t.id.as_str()).unwrap_or("none"),
                "businesses resolved"
            );
        }
        Ok(())
    }

    /// Switch the current business to `id`.
    ///
    /// No-ops (returns false) when `id` is not in the available set;
    /// callers detect the no-op by checking the resulting current tenant.
    /// Never re-fetches membership.
    pub fn switch_business(&self, id: &str) -> bool {
        let state = self.state_tx.borrow().clone();
        let ResolverState::Ready { available, .. } = state else {
            warn!(id, "switch_business before resolver ready");
            return false;
        };

        let Some(tenant) = available.iter().find(|t| t.id == id).cloned() else {
            warn!(id, "switch_business to unavailable business ignored");
            return false;
        };

        self.persist_selection(&tenant.id);
        let _ = self.state_tx.send(ResolverState::Ready {
            current: Some(tenant),
            available,
        });
        true
    }

    async fn load_memberships(&self, user_id: &str, force_refresh: bool) -> Result<Vec<Tenant>> {
        let store = self.store.clone();
        let filters = json!({ "user_id": user_id, "status": "active" });
        self.access_cache
            .fetch_with_cache(
                &format!("memberships.{user_id}"),
                self.config.access_cache_ttl,
                force_refresh,
                || async move {
                    let rows = store.query(MEMBERSHIP_TABLE, &filters).await?;
                    let mut tenants = Vec::with_capacity(rows.len());
                    for row in rows {
                        match serde_json::from_value::<MembershipRow>(row) {
                            Ok(m) => tenants.push(Tenant::from(m)),
                            Err(e) => warn!(error = %e, "skipping malformed membership row"),
                        }
                    }
                    Ok(tenants)
                },
            )
            .await
    }

    /// Pick the current tenant from a fresh membership set.
    ///
    /// Precedence: the in-memory current selection when still a member,
    /// then the persisted id, then the gate's cookie, then the first
    /// available business. Never left pointing at an id outside the set.
    fn select_current(&self, available: &[Tenant]) -> Option<Tenant> {
        let find = |id: &str| available.iter().find(|t| t.id == id).cloned();

        if let Some(current) = self.state_tx.borrow().current() {
            if let Some(tenant) = find(&current.id) {
                return Some(tenant);
            }
        }

        if let Some(id) = self.kv.get_item(&self.config.tenant_storage_key) {
            if let Some(tenant) = find(&id) {
                return Some(tenant);
            }
            debug!(id, "persisted tenant no longer available");
        }

        if let Some(id) = self.cookies.get(&self.config.tenant_cookie_name) {
            if let Some(tenant) = find(&id) {
                return Some(tenant);
            }
        }

        available.first().cloned()
    }

    fn persist_selection(&self, id: &str) {
        if let Err(e) = self.kv.set_item(&self.config.tenant_storage_key, id) {
            debug!(id, error = %e, "tenant selection persist skipped");
        }
    }

    fn commit(&self, token: u64, state: ResolverState) -> bool {
        if self.generation.load(Ordering::SeqCst) != token {
            debug!(token, "discarding stale resolver response");
            return false;
        }
        let _ = self.state_tx.send(state);
        true
    }
}

/// Re-resolve on every session transition (login, logout, refresh).
///
/// The returned handle must be aborted on teardown.
pub fn spawn_session_watch(resolver: Arc<BusinessResolver>) -> JoinHandle<()> {
    let mut rx = resolver.sessions.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            debug!("session changed, re-resolving businesses");
            let _ = resolver.fetch_businesses().await;
        }
    })
}
