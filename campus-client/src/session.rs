//! Authentication state shared across the client.
//!
//! Identity acquisition happens outside this crate; the session only records
//! who is signed in and publishes transitions through a `watch` channel.
//!
//! Every sign-in that follows a sign-out (or a principal switch) gets a new
//! [`SessionId`]. Watchers compare ids rather than principals, since a watch
//! receiver only sees the latest value and may miss the `Anonymous` between
//! two sign-ins of the same principal.

use crate::cache::QueryCache;
use campus_core::Principal;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Identity of one authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The identity provider has not reported yet.
    Initializing,
    Anonymous,
    Authenticated {
        principal: Principal,
        session: SessionId,
    },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthState::Authenticated { principal, .. } => Some(principal),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<SessionId> {
        match self {
            AuthState::Authenticated { session, .. } => Some(*session),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<AuthState>>,
    cache: Arc<QueryCache>,
    next_session: Arc<AtomicU64>,
}

impl Session {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        let (state, _) = watch::channel(AuthState::Initializing);
        Self {
            state: Arc::new(state),
            cache,
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Record a signed-in principal.
    ///
    /// Re-announcing the current principal keeps the running session.
    /// Switching principals without signing out first drops the previous
    /// caller's cached data and starts a new session.
    pub fn sign_in(&self, principal: Principal) {
        self.state.send_if_modified(|state| {
            if state.principal() == Some(&principal) {
                return false;
            }
            if state.is_authenticated() {
                self.cache.clear();
            }
            let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
            tracing::info!(principal = %principal, session = %session, "Signed in");
            *state = AuthState::Authenticated {
                principal: principal.clone(),
                session,
            };
            true
        });
    }

    /// The provider finished initializing without an identity.
    pub fn mark_anonymous(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, AuthState::Initializing) {
                *state = AuthState::Anonymous;
                true
            } else {
                false
            }
        });
    }

    /// Sign out and drop every cached query before anyone can read it again.
    pub fn sign_out(&self) {
        self.cache.clear();
        let previous = self.state.send_replace(AuthState::Anonymous);
        if let AuthState::Authenticated { principal, session } = previous {
            tracing::info!(principal = %principal, session = %session, "Signed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{QueryKey, QueryValue};
    use campus_core::NotificationSummary;

    async fn seeded_cache() -> Arc<QueryCache> {
        let cache = Arc::new(QueryCache::new());
        cache
            .refresh(QueryKey::NotificationsSummary, || async {
                Ok(QueryValue::Summary(NotificationSummary { total: 2, unread: 1 }))
            })
            .await;
        cache
    }

    #[tokio::test]
    async fn starts_initializing_then_anonymous() {
        let session = Session::new(Arc::new(QueryCache::new()));
        assert_eq!(session.state(), AuthState::Initializing);
        session.mark_anonymous();
        assert_eq!(session.state(), AuthState::Anonymous);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn sign_out_clears_cache() {
        let cache = seeded_cache().await;
        let session = Session::new(Arc::clone(&cache));
        session.sign_in(Principal::new("alice"));
        assert!(session.is_authenticated());

        session.sign_out();
        assert_eq!(cache.summary(), None);
        assert_eq!(session.principal(), None);
    }

    #[tokio::test]
    async fn switching_principal_clears_cache() {
        let cache = seeded_cache().await;
        let session = Session::new(Arc::clone(&cache));
        session.sign_in(Principal::new("alice"));
        assert!(cache.summary().is_some());

        session.sign_in(Principal::new("bob"));
        assert_eq!(cache.summary(), None);
        assert_eq!(session.principal(), Some(Principal::new("bob")));
    }

    #[tokio::test]
    async fn sign_in_after_sign_out_is_a_new_session() {
        let session = Session::new(Arc::new(QueryCache::new()));
        let mut rx = session.subscribe();

        session.sign_in(Principal::new("alice"));
        let first = session.state().session();
        session.sign_in(Principal::new("alice"));
        assert_eq!(session.state().session(), first);

        session.sign_out();
        session.sign_in(Principal::new("alice"));
        let second = rx.borrow_and_update().session();
        assert!(second.is_some());
        assert_ne!(second, first);
    }

    #[tokio::test]
    async fn mark_anonymous_does_not_override_sign_in() {
        let session = Session::new(Arc::new(QueryCache::new()));
        session.sign_in(Principal::new("alice"));
        session.mark_anonymous();
        assert!(session.is_authenticated());
    }
}
