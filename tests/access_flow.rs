//! End-to-end tenant access flow.
//!
//! One user with two businesses: `biz-1` is fully onboarded, `biz-2` is
//! still pending. Logging in with `biz-2` persisted as the selection must
//! resolve it as current but route to onboarding; switching to `biz-1`
//! must reach the dashboard without the resolver re-querying membership.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use frontdesk_core::platform::{
    CookieJar, KeyValueStore, MemoryCookieJar, MemoryKv, MemoryStore, RemoteStore,
    StaticSessionService, StoreError,
};
use frontdesk_core::tenant::resolver::MEMBERSHIP_TABLE;
use frontdesk_core::tenant::{BusinessResolver, GateDecision, RouteGate};
use frontdesk_core::{CoreConfig, Session, TenantStatus};

/// Store wrapper counting membership queries, to prove a business switch
/// never re-fetches membership.
struct CountingStore {
    inner: MemoryStore,
    queries: AtomicUsize,
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn query(&self, table: &str, filters: &Value) -> Result<Vec<Value>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(table, filters).await
    }

    async fn insert(&self, table: &str, payload: Value) -> Result<Value, StoreError> {
        self.inner.insert(table, payload).await
    }

    async fn update(&self, table: &str, filters: &Value, payload: Value)
        -> Result<u64, StoreError> {
        self.inner.update(table, filters, payload).await
    }

    async fn delete(&self, table: &str, filters: &Value) -> Result<u64, StoreError> {
        self.inner.delete(table, filters).await
    }

    async fn rpc(&self, name: &str, args: Value) -> Result<Value, StoreError> {
        self.inner.rpc(name, args).await
    }
}

fn membership_row(business_id: &str, name: &str, status: &str) -> Value {
    json!({
        "user_id": "u1",
        "business_id": business_id,
        "status": "active",
        "role": "owner",
        "business_name": name,
        "business_status": status,
    })
}

#[tokio::test]
async fn test_pending_business_onboarding_then_switch_to_dashboard() {
    let inner = MemoryStore::new();
    inner.seed(
        MEMBERSHIP_TABLE,
        vec![
            membership_row("biz-1", "Shear Genius", "active"),
            membership_row("biz-2", "Polish Lab", "pending"),
        ],
    );
    let store = Arc::new(CountingStore {
        inner,
        queries: AtomicUsize::new(0),
    });
    let sessions = Arc::new(StaticSessionService::new(Some(Session {
        user_id: "u1".to_string(),
        email: "u1@example.com".to_string(),
    })));
    let kv = Arc::new(MemoryKv::new());
    let cookies = Arc::new(MemoryCookieJar::new());
    let config = CoreConfig::default();

    // The user previously worked in biz-2
    kv.set_item(&config.tenant_storage_key, "biz-2").unwrap();

    let resolver = BusinessResolver::new(
        store.clone(),
        sessions.clone(),
        kv.clone(),
        cookies.clone(),
        config.clone(),
    );
    let gate = RouteGate::new(
        store.clone(),
        sessions.clone(),
        cookies.clone(),
        kv.clone(),
        config.clone(),
    );

    // Login resolves biz-2 as current because it is persisted and still a member
    resolver.fetch_businesses().await.unwrap();
    let current = resolver.current_tenant().unwrap();
    assert_eq!(current.id, "biz-2");
    assert_eq!(current.status, TenantStatus::Pending);
    assert_eq!(resolver.state().available().len(), 2);

    // Navigating with the current tenant routes to onboarding, not the dashboard
    assert_eq!(
        gate.check_access(None).await,
        GateDecision::OnboardingRequired {
            tenant_id: "biz-2".to_string()
        }
    );

    // Switching to the onboarded business re-queries nothing
    let queries_before = store.queries.load(Ordering::SeqCst);
    assert!(resolver.switch_business("biz-1"));
    assert_eq!(store.queries.load(Ordering::SeqCst), queries_before);
    assert_eq!(resolver.current_tenant().unwrap().id, "biz-1");

    // The gate grants the dashboard for the switched business
    assert_eq!(
        gate.check_access(Some("biz-1")).await,
        GateDecision::Granted {
            tenant_id: "biz-1".to_string()
        }
    );

    // Backend scoping and persistence follow the granted tenant
    assert_eq!(store.inner.tenant_context().as_deref(), Some("biz-1"));
    assert_eq!(cookies.get(&config.tenant_cookie_name).as_deref(), Some("biz-1"));
    assert_eq!(
        kv.get_item(&config.tenant_storage_key).as_deref(),
        Some("biz-1")
    );
}

#[tokio::test]
async fn test_logout_invalidates_trust_in_persisted_selection() {
    let inner = MemoryStore::new();
    inner.seed(
        MEMBERSHIP_TABLE,
        vec![membership_row("biz-1", "Shear Genius", "active")],
    );
    let store = Arc::new(CountingStore {
        inner,
        queries: AtomicUsize::new(0),
    });
    let sessions = Arc::new(StaticSessionService::new(Some(Session {
        user_id: "u1".to_string(),
        email: "u1@example.com".to_string(),
    })));
    let kv = Arc::new(MemoryKv::new());
    let cookies = Arc::new(MemoryCookieJar::new());
    let config = CoreConfig::default();

    let resolver = BusinessResolver::new(
        store.clone(),
        sessions.clone(),
        kv.clone(),
        cookies.clone(),
        config.clone(),
    );
    let gate = RouteGate::new(
        store.clone(),
        sessions.clone(),
        cookies.clone(),
        kv.clone(),
        config.clone(),
    );

    resolver.fetch_businesses().await.unwrap();
    assert!(resolver.current_tenant().is_some());

    sessions.sign_out();
    resolver.fetch_businesses().await.unwrap();

    // The persisted id survives, but nothing is current without a session
    assert!(resolver.current_tenant().is_none());
    assert_eq!(gate.check_access(None).await, GateDecision::NoSession);
}
