//! Read-only view models derived from query results.

use campus_core::{
    partition_notifications, Announcement, Notification, NotificationPartition,
    NotificationSummary, Principal, UserProfile,
};

/// Announcements shown on the dashboard.
pub const RECENT_ANNOUNCEMENTS: usize = 3;

/// Count shown on the notifications badge; hidden when nothing is unread.
pub fn unread_badge(summary: Option<&NotificationSummary>) -> Option<u64> {
    summary.map(|s| s.unread).filter(|unread| *unread > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView<'a> {
    pub greeting: String,
    pub total_announcements: usize,
    pub unread_notifications: u64,
    pub recent: &'a [Announcement],
}

impl<'a> DashboardView<'a> {
    /// `announcements` is expected newest first, as the gateway returns it.
    pub fn build(
        profile: Option<&UserProfile>,
        announcements: &'a [Announcement],
        summary: Option<&NotificationSummary>,
    ) -> Self {
        let greeting = match profile {
            Some(profile) => format!("Welcome back, {}!", profile.display_name),
            None => "Welcome back!".to_string(),
        };
        let recent = &announcements[..announcements.len().min(RECENT_ANNOUNCEMENTS)];
        Self {
            greeting,
            total_announcements: announcements.len(),
            unread_notifications: summary.map(|s| s.unread).unwrap_or(0),
            recent,
        }
    }
}

/// Whether `caller` may delete `announcement`.
pub fn can_delete(announcement: &Announcement, caller: Option<&Principal>) -> bool {
    caller.is_some_and(|caller| announcement.is_authored_by(caller))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxView<'a> {
    Empty,
    Populated(NotificationPartition<'a>),
}

impl<'a> InboxView<'a> {
    pub fn build(notifications: &'a [Notification]) -> Self {
        let partition = partition_notifications(notifications);
        if partition.is_empty() {
            InboxView::Empty
        } else {
            InboxView::Populated(partition)
        }
    }

    pub fn unread_count(&self) -> usize {
        match self {
            InboxView::Empty => 0,
            InboxView::Populated(partition) => partition.unread.len(),
        }
    }
}
