//! Campus Test Utilities
//!
//! Shared test infrastructure for the campus workspace:
//! - An in-memory gateway with failure injection and call counting
//! - A recording alert sink
//! - Fixtures for common entities
//! - Proptest generators

pub use campus_client::{Alert, AlertSink, Gateway, GatewayError, GatewayResult};
pub use campus_core::{
    Announcement, AnnouncementId, NewAnnouncement, Notification, NotificationId,
    NotificationSummary, Principal, UserProfile,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// ============================================================================
// MOCK GATEWAY
// ============================================================================

#[derive(Debug, Default)]
struct GatewayState {
    profiles: HashMap<Principal, UserProfile>,
    /// Newest first.
    announcements: Vec<Announcement>,
    notifications: HashMap<Principal, Vec<Notification>>,
    next_announcement_id: u64,
    next_notification_id: u64,
    calls: HashMap<&'static str, u64>,
    failure: Option<GatewayError>,
    latency: Option<Duration>,
}

/// In-memory backend.
///
/// Creating an announcement notifies every other principal the gateway knows
/// about (anyone with a profile or an inbox).
#[derive(Debug, Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every call fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<GatewayError>) {
        self.lock().failure = error;
    }

    /// Delay every call by `latency` (honours paused tokio time).
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Number of times `operation` was called (trait method name).
    pub fn calls(&self, operation: &str) -> u64 {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn insert_profile(&self, profile: UserProfile) {
        let mut state = self.lock();
        state.notifications.entry(profile.principal.clone()).or_default();
        state.profiles.insert(profile.principal.clone(), profile);
    }

    /// Deliver a notification straight to `recipient`'s inbox.
    pub fn push_notification(&self, recipient: &Principal, message: &str) -> NotificationId {
        let mut state = self.lock();
        state.next_notification_id += 1;
        let id = NotificationId(state.next_notification_id);
        state
            .notifications
            .entry(recipient.clone())
            .or_default()
            .insert(
                0,
                Notification {
                    id,
                    message: message.to_string(),
                    reference_id: AnnouncementId(0),
                    created_timestamp: Utc::now(),
                    is_read: false,
                },
            );
        id
    }

    pub fn unread_count(&self, principal: &Principal) -> u64 {
        self.lock()
            .notifications
            .get(principal)
            .map(|list| list.iter().filter(|n| !n.is_read).count() as u64)
            .unwrap_or(0)
    }

    async fn enter(&self, operation: &'static str) -> GatewayResult<()> {
        let latency = {
            let mut state = self.lock();
            *state.calls.entry(operation).or_insert(0) += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.lock().failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn get_caller_user_profile(
        &self,
        caller: &Principal,
    ) -> GatewayResult<Option<UserProfile>> {
        self.enter("get_caller_user_profile").await?;
        Ok(self.lock().profiles.get(caller).cloned())
    }

    async fn save_caller_user_profile(
        &self,
        caller: &Principal,
        profile: &UserProfile,
    ) -> GatewayResult<()> {
        self.enter("save_caller_user_profile").await?;
        if &profile.principal != caller {
            return Err(GatewayError::Rejected {
                status: 403,
                message: "Cannot save another user's profile".to_string(),
            });
        }
        self.insert_profile(profile.clone());
        Ok(())
    }

    async fn list_announcements(&self, _caller: &Principal) -> GatewayResult<Vec<Announcement>> {
        self.enter("list_announcements").await?;
        Ok(self.lock().announcements.clone())
    }

    async fn get_announcement(
        &self,
        _caller: &Principal,
        id: AnnouncementId,
    ) -> GatewayResult<Option<Announcement>> {
        self.enter("get_announcement").await?;
        Ok(self.lock().announcements.iter().find(|a| a.id == id).cloned())
    }

    async fn create_announcement(
        &self,
        caller: &Principal,
        draft: &NewAnnouncement,
    ) -> GatewayResult<AnnouncementId> {
        self.enter("create_announcement").await?;
        let mut state = self.lock();
        state.next_announcement_id += 1;
        let id = AnnouncementId(state.next_announcement_id);
        let now = Utc::now();
        state.announcements.insert(
            0,
            Announcement {
                id,
                title: draft.title.clone(),
                body: draft.body.clone(),
                author: caller.clone(),
                created_timestamp: now,
            },
        );

        let recipients: Vec<Principal> = state
            .notifications
            .keys()
            .filter(|p| *p != caller)
            .cloned()
            .collect();
        for recipient in recipients {
            state.next_notification_id += 1;
            let notification = Notification {
                id: NotificationId(state.next_notification_id),
                message: format!("New announcement: {}", draft.title),
                reference_id: id,
                created_timestamp: now,
                is_read: false,
            };
            state.notifications.entry(recipient).or_default().insert(0, notification);
        }
        Ok(id)
    }

    async fn delete_announcement(&self, caller: &Principal, id: AnnouncementId) -> GatewayResult<()> {
        self.enter("delete_announcement").await?;
        let mut state = self.lock();
        let position = state
            .announcements
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| GatewayError::NotFound(format!("announcement {}", id)))?;
        if !state.announcements[position].is_authored_by(caller) {
            return Err(GatewayError::Rejected {
                status: 403,
                message: "Only the author can delete this announcement".to_string(),
            });
        }
        state.announcements.remove(position);
        Ok(())
    }

    async fn get_notifications(&self, caller: &Principal) -> GatewayResult<Vec<Notification>> {
        self.enter("get_notifications").await?;
        Ok(self.lock().notifications.get(caller).cloned().unwrap_or_default())
    }

    async fn get_notifications_summary(
        &self,
        caller: &Principal,
    ) -> GatewayResult<NotificationSummary> {
        self.enter("get_notifications_summary").await?;
        let state = self.lock();
        let list = state.notifications.get(caller).map(Vec::as_slice).unwrap_or(&[]);
        Ok(NotificationSummary::from_notifications(list))
    }

    async fn mark_notification_as_read(
        &self,
        caller: &Principal,
        id: NotificationId,
    ) -> GatewayResult<()> {
        self.enter("mark_notification_as_read").await?;
        let mut state = self.lock();
        let notification = state
            .notifications
            .get_mut(caller)
            .and_then(|list| list.iter_mut().find(|n| n.id == id))
            .ok_or_else(|| GatewayError::NotFound(format!("notification {}", id)))?;
        notification.is_read = true;
        Ok(())
    }
}

// ============================================================================
// RECORDING ALERT SINK
// ============================================================================

#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.alerts().into_iter().map(|alert| alert.text).collect()
    }

    pub fn clear(&self) {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl AlertSink for RecordingAlertSink {
    fn emit(&self, alert: Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(alert);
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    pub fn principal(name: &str) -> Principal {
        Principal::new(name)
    }

    pub fn profile(name: &str, display_name: &str) -> UserProfile {
        UserProfile {
            principal: principal(name),
            display_name: display_name.to_string(),
            department: None,
        }
    }

    pub fn announcement(id: u64, author: &str, title: &str) -> Announcement {
        Announcement {
            id: AnnouncementId(id),
            title: title.to_string(),
            body: format!("Details for {}", title),
            author: principal(author),
            created_timestamp: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).single().unwrap_or_default(),
        }
    }

    pub fn notification(id: u64, is_read: bool) -> Notification {
        Notification {
            id: NotificationId(id),
            message: format!("Notification {}", id),
            reference_id: AnnouncementId(id),
            created_timestamp: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).single().unwrap_or_default(),
            is_read,
        }
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_notification() -> impl Strategy<Value = Notification> {
        (1u64..10_000, any::<bool>(), "[a-z ]{1,24}").prop_map(|(id, is_read, message)| {
            Notification {
                id: NotificationId(id),
                message,
                reference_id: AnnouncementId(id),
                created_timestamp: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).single().unwrap_or_default(),
                is_read,
            }
        })
    }

    pub fn arb_notifications(max: usize) -> impl Strategy<Value = Vec<Notification>> {
        prop::collection::vec(arb_notification(), 0..max)
    }

    /// Summaries that respect `unread <= total`.
    pub fn arb_summary() -> impl Strategy<Value = NotificationSummary> {
        (0u64..1_000)
            .prop_flat_map(|total| (Just(total), 0..=total))
            .prop_map(|(total, unread)| NotificationSummary { total, unread })
    }

    pub fn arb_principal() -> impl Strategy<Value = Principal> {
        "[a-z0-9]{5}-[a-z0-9]{5}".prop_map(Principal::new)
    }
}
