//! Typed reads and mutations over the gateway and query cache.
//!
//! Reads are served from the cache while the entry is fresh and refetched
//! once invalidated. Mutations call the gateway directly and, on success,
//! invalidate the keys whose contents they change, then refetch the ones that
//! were cached before the mutation returns:
//!
//! | mutation               | invalidated keys                                   |
//! |------------------------|----------------------------------------------------|
//! | save profile           | `CurrentUserProfile`                               |
//! | create announcement    | `Announcements`, `Notifications`, `NotificationsSummary` |
//! | delete announcement    | `Announcements`, `Announcement(id)`                |
//! | mark notification read | `Notifications`, `NotificationsSummary`            |
//!
//! Each mutation also reports its outcome through the alert sink.

use crate::alerts::{Alert, AlertSink};
use crate::cache::{CacheEvent, QueryCache, QueryKey, QueryValue, RefreshOutcome};
use crate::error::{ClientError, ClientResult};
use crate::gateway::{Gateway, GatewayResult};
use crate::session::Session;
use campus_core::{
    Announcement, AnnouncementId, NewAnnouncement, Notification, NotificationId,
    NotificationSummary, Principal, UserProfile,
};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Queries {
    gateway: Arc<dyn Gateway>,
    cache: Arc<QueryCache>,
    session: Session,
    alerts: Arc<dyn AlertSink>,
}

impl Queries {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        cache: Arc<QueryCache>,
        session: Session,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            gateway,
            cache,
            session,
            alerts,
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn caller(&self) -> ClientResult<Principal> {
        self.session.principal().ok_or(ClientError::NotAuthenticated)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn caller_profile(&self) -> ClientResult<Option<UserProfile>> {
        match self.read(QueryKey::CurrentUserProfile).await? {
            QueryValue::Profile(profile) => Ok(profile),
            _ => Err(ClientError::UnexpectedValue {
                key: QueryKey::CurrentUserProfile,
            }),
        }
    }

    pub async fn announcements(&self) -> ClientResult<Vec<Announcement>> {
        match self.read(QueryKey::Announcements).await? {
            QueryValue::Announcements(list) => Ok(list),
            _ => Err(ClientError::UnexpectedValue {
                key: QueryKey::Announcements,
            }),
        }
    }

    pub async fn announcement(&self, id: AnnouncementId) -> ClientResult<Option<Announcement>> {
        let key = QueryKey::Announcement(id);
        match self.read(key.clone()).await? {
            QueryValue::Announcement(announcement) => Ok(announcement),
            _ => Err(ClientError::UnexpectedValue { key }),
        }
    }

    pub async fn notifications(&self) -> ClientResult<Vec<Notification>> {
        match self.read(QueryKey::Notifications).await? {
            QueryValue::Notifications(list) => Ok(list),
            _ => Err(ClientError::UnexpectedValue {
                key: QueryKey::Notifications,
            }),
        }
    }

    pub async fn notifications_summary(&self) -> ClientResult<NotificationSummary> {
        match self.read(QueryKey::NotificationsSummary).await? {
            QueryValue::Summary(summary) => Ok(summary),
            _ => Err(ClientError::UnexpectedValue {
                key: QueryKey::NotificationsSummary,
            }),
        }
    }

    async fn read(&self, key: QueryKey) -> ClientResult<QueryValue> {
        let caller = self.caller()?;
        if let Some(value) = self.cache.get_fresh(&key) {
            return Ok(value);
        }

        // Subscribe first so a fetch we end up joining cannot finish unseen.
        let mut events = self.cache.subscribe();
        let gateway = Arc::clone(&self.gateway);
        let fetch_key = key.clone();
        let outcome = self
            .cache
            .refresh(key.clone(), move || async move {
                fetch(gateway.as_ref(), &caller, &fetch_key).await
            })
            .await;

        match outcome {
            RefreshOutcome::Fresh(value) => Ok(value),
            RefreshOutcome::Failed(error) => Err(error.into()),
            RefreshOutcome::Unchanged => self.await_in_flight(key, &mut events).await,
        }
    }

    async fn await_in_flight(
        &self,
        key: QueryKey,
        events: &mut broadcast::Receiver<CacheEvent>,
    ) -> ClientResult<QueryValue> {
        loop {
            if !self.cache.is_in_flight(&key) {
                // Either the joined fetch already landed or its epoch was cleared.
                return match self.cache.get(&key) {
                    Some(entry) => Ok(entry.value),
                    None => Err(ClientError::Superseded { key }),
                };
            }
            match events.recv().await {
                Ok(CacheEvent::Failed { key: failed, error }) if failed == key => {
                    return Err(error.into());
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ClientError::Superseded { key });
                }
            }
        }
    }

    /// Invalidate `key` and fetch it again, returning the refresh outcome.
    pub async fn invalidate_and_refetch(&self, key: QueryKey) -> RefreshOutcome {
        self.cache.invalidate(&key);
        self.refetch(key).await
    }

    /// Invalidate every key in `keys`, then refetch those that held a value.
    async fn invalidate_active(&self, keys: &[QueryKey]) {
        let active: Vec<QueryKey> = keys
            .iter()
            .filter(|key| self.cache.invalidate(key))
            .cloned()
            .collect();
        for key in active {
            if let RefreshOutcome::Failed(error) = self.refetch(key.clone()).await {
                tracing::debug!(?key, error = %error, "Refetch after mutation failed");
            }
        }
    }

    async fn refetch(&self, key: QueryKey) -> RefreshOutcome {
        let caller = match self.caller() {
            Ok(caller) => caller,
            Err(_) => return RefreshOutcome::Unchanged,
        };
        let gateway = Arc::clone(&self.gateway);
        let fetch_key = key.clone();
        self.cache
            .refresh(key, move || async move {
                fetch(gateway.as_ref(), &caller, &fetch_key).await
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub async fn save_caller_profile(
        &self,
        display_name: &str,
        department: &str,
    ) -> ClientResult<UserProfile> {
        let result = self.try_save_caller_profile(display_name, department).await;
        self.report(&result, "Profile updated successfully!", "Failed to update profile");
        result
    }

    async fn try_save_caller_profile(
        &self,
        display_name: &str,
        department: &str,
    ) -> ClientResult<UserProfile> {
        let caller = self.caller()?;
        let profile = UserProfile::new(caller.clone(), display_name, department)?;
        self.gateway.save_caller_user_profile(&caller, &profile).await?;
        self.invalidate_active(&[QueryKey::CurrentUserProfile]).await;
        Ok(profile)
    }

    pub async fn create_announcement(&self, title: &str, body: &str) -> ClientResult<AnnouncementId> {
        let result = self.try_create_announcement(title, body).await;
        self.report(
            &result,
            "Announcement created successfully!",
            "Failed to create announcement",
        );
        result
    }

    async fn try_create_announcement(&self, title: &str, body: &str) -> ClientResult<AnnouncementId> {
        let caller = self.caller()?;
        let draft = NewAnnouncement::new(title, body)?;
        let id = self.gateway.create_announcement(&caller, &draft).await?;
        tracing::info!(announcement_id = %id, "Announcement created");
        self.invalidate_active(&[
            QueryKey::Announcements,
            QueryKey::Notifications,
            QueryKey::NotificationsSummary,
        ])
        .await;
        Ok(id)
    }

    pub async fn delete_announcement(&self, id: AnnouncementId) -> ClientResult<()> {
        let result = self.try_delete_announcement(id).await;
        self.report(
            &result,
            "Announcement deleted successfully",
            "Failed to delete announcement",
        );
        result
    }

    async fn try_delete_announcement(&self, id: AnnouncementId) -> ClientResult<()> {
        let caller = self.caller()?;
        self.gateway.delete_announcement(&caller, id).await?;
        tracing::info!(announcement_id = %id, "Announcement deleted");
        self.invalidate_active(&[QueryKey::Announcements, QueryKey::Announcement(id)])
            .await;
        Ok(())
    }

    pub async fn mark_notification_as_read(&self, id: NotificationId) -> ClientResult<()> {
        let result = self.try_mark_notification_as_read(id).await;
        self.report(
            &result,
            "Notification marked as read",
            "Failed to mark notification as read",
        );
        result
    }

    async fn try_mark_notification_as_read(&self, id: NotificationId) -> ClientResult<()> {
        let caller = self.caller()?;
        self.gateway.mark_notification_as_read(&caller, id).await?;
        self.invalidate_active(&[QueryKey::Notifications, QueryKey::NotificationsSummary])
            .await;
        Ok(())
    }

    fn report<T>(&self, result: &ClientResult<T>, success: &str, failure: &str) {
        match result {
            Ok(_) => self.alerts.emit(Alert::success(success)),
            Err(err) => {
                tracing::warn!(error = %err, "{}", failure);
                self.alerts.emit(Alert::error(err.alert_text(failure)));
            }
        }
    }
}

async fn fetch(
    gateway: &dyn Gateway,
    caller: &Principal,
    key: &QueryKey,
) -> GatewayResult<QueryValue> {
    let value = match key {
        QueryKey::CurrentUserProfile => {
            QueryValue::Profile(gateway.get_caller_user_profile(caller).await?)
        }
        QueryKey::Announcements => {
            QueryValue::Announcements(gateway.list_announcements(caller).await?)
        }
        QueryKey::Announcement(id) => {
            QueryValue::Announcement(gateway.get_announcement(caller, *id).await?)
        }
        QueryKey::Notifications => {
            QueryValue::Notifications(gateway.get_notifications(caller).await?)
        }
        QueryKey::NotificationsSummary => {
            QueryValue::Summary(gateway.get_notifications_summary(caller).await?)
        }
    };
    Ok(value)
}
