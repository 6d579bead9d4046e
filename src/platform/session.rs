//! Identity/session service interface.
//!
//! The auth service is external; the core observes who is logged in and
//! reacts to authenticated -> unauthenticated transitions. Session loss
//! invalidates trust in the persisted tenant selection, so the resolver
//! subscribes to changes rather than polling.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::types::Session;

/// Read access to the backend identity session.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// The current session, if any.
    async fn get_session(&self) -> Option<Session>;

    /// Subscribe to session transitions (login, logout, refresh).
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// Session service backed by a watch channel, for tests and local use.
pub struct StaticSessionService {
    tx: watch::Sender<Option<Session>>,
    // Keeps the channel open so sends store the value even with no subscribers
    _rx: watch::Receiver<Option<Session>>,
}

impl StaticSessionService {
    pub fn new(initial: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx, _rx }
    }

    /// Simulate a login.
    pub fn sign_in(&self, session: Session) {
        let _ = self.tx.send(Some(session));
    }

    /// Simulate a logout.
    pub fn sign_out(&self) {
        let _ = self.tx.send(None);
    }
}

#[async_trait]
impl SessionService for StaticSessionService {
    async fn get_session(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}
