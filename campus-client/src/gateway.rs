//! Contract with the remote backend of record.
//!
//! Every call is atomic and runs as the caller identified by `Principal`.
//! Retries are the transport's concern; a failed call is reported once.

use async_trait::async_trait;
use campus_core::{
    Announcement, AnnouncementId, NewAnnouncement, Notification, NotificationId,
    NotificationSummary, Principal, UserProfile, ValidationError,
};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Text suitable for an error alert.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Rejected { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::InvalidResponse(err.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Operations the backend exposes to an authenticated caller.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `Ok(None)` when the caller has not created a profile yet.
    async fn get_caller_user_profile(&self, caller: &Principal)
        -> GatewayResult<Option<UserProfile>>;

    async fn save_caller_user_profile(
        &self,
        caller: &Principal,
        profile: &UserProfile,
    ) -> GatewayResult<()>;

    async fn list_announcements(&self, caller: &Principal) -> GatewayResult<Vec<Announcement>>;

    async fn get_announcement(
        &self,
        caller: &Principal,
        id: AnnouncementId,
    ) -> GatewayResult<Option<Announcement>>;

    async fn create_announcement(
        &self,
        caller: &Principal,
        draft: &NewAnnouncement,
    ) -> GatewayResult<AnnouncementId>;

    async fn delete_announcement(&self, caller: &Principal, id: AnnouncementId)
        -> GatewayResult<()>;

    async fn get_notifications(&self, caller: &Principal) -> GatewayResult<Vec<Notification>>;

    /// Idempotent; safe to call on every poll tick.
    async fn get_notifications_summary(
        &self,
        caller: &Principal,
    ) -> GatewayResult<NotificationSummary>;

    /// After success, the next summary read reflects the decrement.
    async fn mark_notification_as_read(
        &self,
        caller: &Principal,
        id: NotificationId,
    ) -> GatewayResult<()>;
}
