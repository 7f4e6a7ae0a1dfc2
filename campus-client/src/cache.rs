//! Keyed query cache with explicit invalidation.
//!
//! The cache memoizes the latest gateway result per [`QueryKey`] and owns no
//! business logic. Staleness is explicit: an invalidated entry stays readable
//! but is flagged so the next read refetches it.
//!
//! Every refresh outcome is broadcast as a [`CacheEvent`], which is how the
//! notification poller learns about summaries fetched by anyone.
//!
//! Refreshes of one key coalesce: while a fetch is in flight, further refresh
//! requests for that key join it instead of calling the gateway again. The
//! cache epoch advances on [`QueryCache::clear`]; a response that started
//! under an older epoch is discarded when it lands.

use crate::gateway::{GatewayError, GatewayResult};
use campus_core::{
    Announcement, AnnouncementId, Notification, NotificationSummary, Timestamp, UserProfile,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Logical query identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    CurrentUserProfile,
    Announcements,
    Announcement(AnnouncementId),
    Notifications,
    NotificationsSummary,
}

/// A cached query result.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Profile(Option<UserProfile>),
    Announcements(Vec<Announcement>),
    Announcement(Option<Announcement>),
    Notifications(Vec<Notification>),
    Summary(NotificationSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: QueryValue,
    pub fetched_at: Timestamp,
    pub stale: bool,
}

/// Published after every refresh that reaches the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Updated { key: QueryKey },
    Failed { key: QueryKey, error: GatewayError },
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated { key } | CacheEvent::Failed { key, .. } => key,
        }
    }
}

/// Result of a refresh request.
///
/// `Unchanged` means this call did not produce a value: it joined a fetch
/// already in flight, or its response belonged to a cleared epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Fresh(QueryValue),
    Unchanged,
    Failed(GatewayError),
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    in_flight: HashSet<QueryKey>,
    /// Keys invalidated while their fetch was in flight.
    invalidated_in_flight: HashSet<QueryKey>,
    epoch: u64,
}

pub struct QueryCache {
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(CacheState::default()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // State is plain data; a panic mid-update cannot leave it half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.lock().entries.get(key).cloned()
    }

    /// Cached value if present and not invalidated.
    pub fn get_fresh(&self, key: &QueryKey) -> Option<QueryValue> {
        self.lock()
            .entries
            .get(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.value.clone())
    }

    pub fn summary(&self) -> Option<NotificationSummary> {
        match self.get(&QueryKey::NotificationsSummary)?.value {
            QueryValue::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn notifications(&self) -> Option<Vec<Notification>> {
        match self.get(&QueryKey::Notifications)?.value {
            QueryValue::Notifications(list) => Some(list),
            _ => None,
        }
    }

    pub fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.lock().in_flight.contains(key)
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Mark an entry stale. Returns whether an entry existed.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = self.lock();
        if state.in_flight.contains(key) {
            state.invalidated_in_flight.insert(key.clone());
        }
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Drop every entry and start a new epoch.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.in_flight.clear();
        state.invalidated_in_flight.clear();
        state.epoch += 1;
        tracing::debug!(epoch = state.epoch, "Query cache cleared");
    }

    /// Fetch `key` through `fetch` and store the result.
    pub async fn refresh<F, Fut>(&self, key: QueryKey, fetch: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<QueryValue>>,
    {
        let epoch = {
            let mut state = self.lock();
            if !state.in_flight.insert(key.clone()) {
                tracing::trace!(?key, "Refresh joined in-flight fetch");
                return RefreshOutcome::Unchanged;
            }
            state.epoch
        };
        let mut guard = InFlightGuard {
            cache: self,
            key: key.clone(),
            epoch,
            armed: true,
        };

        let result = fetch().await;

        let event = {
            let mut state = self.lock();
            if state.epoch != epoch {
                tracing::debug!(
                    ?key,
                    epoch,
                    current = state.epoch,
                    "Discarding response from cleared epoch"
                );
                return RefreshOutcome::Unchanged;
            }
            state.in_flight.remove(&key);
            let invalidated = state.invalidated_in_flight.remove(&key);
            match &result {
                Ok(value) => {
                    state.entries.insert(
                        key.clone(),
                        CacheEntry {
                            value: value.clone(),
                            fetched_at: Utc::now(),
                            stale: invalidated,
                        },
                    );
                    CacheEvent::Updated { key: key.clone() }
                }
                Err(error) => CacheEvent::Failed {
                    key: key.clone(),
                    error: error.clone(),
                },
            }
        };
        guard.armed = false;

        // No subscribers is fine.
        let _ = self.events.send(event);

        match result {
            Ok(value) => RefreshOutcome::Fresh(value),
            Err(error) => {
                tracing::warn!(?key, error = %error, "Query refresh failed");
                RefreshOutcome::Failed(error)
            }
        }
    }
}

/// Releases the in-flight marker if a refresh future is dropped mid-fetch.
struct InFlightGuard<'a> {
    cache: &'a QueryCache,
    key: QueryKey,
    epoch: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cache.lock();
        if state.epoch == self.epoch {
            state.in_flight.remove(&self.key);
            state.invalidated_in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn summary(total: u64, unread: u64) -> QueryValue {
        QueryValue::Summary(NotificationSummary { total, unread })
    }

    #[tokio::test]
    async fn refresh_stores_value_and_broadcasts() {
        let cache = QueryCache::new();
        let mut events = cache.subscribe();

        let outcome = cache
            .refresh(QueryKey::NotificationsSummary, || async { Ok(summary(5, 3)) })
            .await;

        assert_eq!(outcome, RefreshOutcome::Fresh(summary(5, 3)));
        assert_eq!(cache.summary(), Some(NotificationSummary { total: 5, unread: 3 }));
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Updated {
                key: QueryKey::NotificationsSummary
            }
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_value() {
        let cache = QueryCache::new();
        cache
            .refresh(QueryKey::NotificationsSummary, || async { Ok(summary(5, 3)) })
            .await;
        let before = cache.get(&QueryKey::NotificationsSummary).unwrap();

        let outcome = cache
            .refresh(QueryKey::NotificationsSummary, || async {
                Err(GatewayError::Unavailable("offline".to_string()))
            })
            .await;

        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        assert_eq!(cache.get(&QueryKey::NotificationsSummary).unwrap(), before);
        assert!(!cache.is_in_flight(&QueryKey::NotificationsSummary));
    }

    #[tokio::test]
    async fn overlapping_refreshes_coalesce() {
        let cache = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .refresh(QueryKey::Notifications, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        Ok(QueryValue::Notifications(Vec::new()))
                    })
                    .await
            })
        };
        while !cache.is_in_flight(&QueryKey::Notifications) {
            tokio::task::yield_now().await;
        }

        let calls_second = Arc::clone(&calls);
        let second = cache
            .refresh(QueryKey::Notifications, || async move {
                calls_second.fetch_add(1, Ordering::SeqCst);
                Ok(QueryValue::Notifications(Vec::new()))
            })
            .await;
        assert_eq!(second, RefreshOutcome::Unchanged);

        release_tx.send(()).unwrap();
        let first = first.await.unwrap();
        assert_eq!(first, RefreshOutcome::Fresh(QueryValue::Notifications(Vec::new())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn response_from_cleared_epoch_is_discarded() {
        let cache = Arc::new(QueryCache::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .refresh(QueryKey::NotificationsSummary, || async move {
                        let _ = release_rx.await;
                        Ok(summary(9, 9))
                    })
                    .await
            })
        };
        while !cache.is_in_flight(&QueryKey::NotificationsSummary) {
            tokio::task::yield_now().await;
        }

        cache.clear();
        release_tx.send(()).unwrap();

        assert_eq!(pending.await.unwrap(), RefreshOutcome::Unchanged);
        assert_eq!(cache.summary(), None);
        assert_eq!(cache.epoch(), 1);
    }

    #[tokio::test]
    async fn invalidation_marks_entry_stale() {
        let cache = QueryCache::new();
        assert!(!cache.invalidate(&QueryKey::Announcements));

        cache
            .refresh(QueryKey::Announcements, || async {
                Ok(QueryValue::Announcements(Vec::new()))
            })
            .await;
        assert!(cache.get_fresh(&QueryKey::Announcements).is_some());

        assert!(cache.invalidate(&QueryKey::Announcements));
        assert!(cache.get_fresh(&QueryKey::Announcements).is_none());
        assert!(cache.get(&QueryKey::Announcements).unwrap().stale);
    }

    #[tokio::test]
    async fn dropped_refresh_releases_in_flight_marker() {
        let cache = QueryCache::new();
        {
            let fut = cache.refresh(QueryKey::Notifications, || std::future::pending());
            tokio::pin!(fut);
            let _ = tokio::time::timeout(std::time::Duration::from_millis(5), &mut fut).await;
            assert!(cache.is_in_flight(&QueryKey::Notifications));
        }
        assert!(!cache.is_in_flight(&QueryKey::Notifications));
    }
}
