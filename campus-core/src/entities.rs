//! Campus entities as returned by the gateway.

use crate::error::{ValidationError, ValidationResult};
use crate::identity::{AnnouncementId, NotificationId, Principal, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// ANNOUNCEMENTS
// ============================================================================

/// A posted announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: AnnouncementId,
    pub title: String,
    pub body: String,
    pub author: Principal,
    pub created_timestamp: Timestamp,
}

impl Announcement {
    /// Whether `caller` posted this announcement.
    pub fn is_authored_by(&self, caller: &Principal) -> bool {
        &self.author == caller
    }
}

/// Validated input for creating an announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    pub body: String,
}

impl NewAnnouncement {
    /// Trim both fields and reject the draft if either ends up empty.
    pub fn new(title: &str, body: &str) -> ValidationResult<Self> {
        let title = title.trim();
        let body = body.trim();
        if title.is_empty() {
            return Err(ValidationError::RequiredFieldMissing { field: "title" });
        }
        if body.is_empty() {
            return Err(ValidationError::RequiredFieldMissing { field: "body" });
        }
        Ok(Self {
            title: title.to_string(),
            body: body.to_string(),
        })
    }
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// A per-user notification about an announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    /// Announcement this notification points at.
    pub reference_id: AnnouncementId,
    pub created_timestamp: Timestamp,
    pub is_read: bool,
}

/// Counts of the caller's notifications.
///
/// Invariant: `unread <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub total: u64,
    pub unread: u64,
}

impl NotificationSummary {
    pub fn new(total: u64, unread: u64) -> ValidationResult<Self> {
        let summary = Self { total, unread };
        summary.validate()?;
        Ok(summary)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if self.unread > self.total {
            return Err(ValidationError::UnreadExceedsTotal {
                unread: self.unread,
                total: self.total,
            });
        }
        Ok(())
    }

    /// Summarize a notification list.
    pub fn from_notifications(notifications: &[Notification]) -> Self {
        let unread = notifications.iter().filter(|n| !n.is_read).count() as u64;
        Self {
            total: notifications.len() as u64,
            unread,
        }
    }
}

/// Notifications split by read state, each side in gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationPartition<'a> {
    pub unread: Vec<&'a Notification>,
    pub read: Vec<&'a Notification>,
}

impl NotificationPartition<'_> {
    pub fn is_empty(&self) -> bool {
        self.unread.is_empty() && self.read.is_empty()
    }
}

/// Split notifications into unread and read, preserving order.
pub fn partition_notifications(notifications: &[Notification]) -> NotificationPartition<'_> {
    let (read, unread): (Vec<&Notification>, Vec<&Notification>) =
        notifications.iter().partition(|n| n.is_read);
    NotificationPartition { unread, read }
}

// ============================================================================
// PROFILES
// ============================================================================

/// The caller's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub principal: Principal,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl UserProfile {
    /// Build a profile from form input. A blank department is dropped.
    pub fn new(principal: Principal, display_name: &str, department: &str) -> ValidationResult<Self> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "display_name",
            });
        }
        let department = department.trim();
        Ok(Self {
            principal,
            display_name: display_name.to_string(),
            department: (!department.is_empty()).then(|| department.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn notification(id: u64, is_read: bool) -> Notification {
        Notification {
            id: NotificationId(id),
            message: format!("New announcement {}", id),
            reference_id: AnnouncementId(id),
            created_timestamp: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            is_read,
        }
    }

    #[test]
    fn new_announcement_trims_fields() {
        let draft = NewAnnouncement::new("  Library hours ", "\nOpen late\t").unwrap();
        assert_eq!(draft.title, "Library hours");
        assert_eq!(draft.body, "Open late");
    }

    #[test]
    fn new_announcement_rejects_blank_fields() {
        assert_eq!(
            NewAnnouncement::new("   ", "body"),
            Err(ValidationError::RequiredFieldMissing { field: "title" })
        );
        let err = NewAnnouncement::new("title", "").unwrap_err();
        assert_eq!(err.user_message(), "Please fill in all fields");
    }

    #[test]
    fn profile_drops_blank_department() {
        let profile = UserProfile::new(Principal::new("aaaaa-aa"), " Ada ", "   ").unwrap();
        assert_eq!(profile.display_name, "Ada");
        assert_eq!(profile.department, None);

        let profile = UserProfile::new(Principal::new("aaaaa-aa"), "Ada", " Physics ").unwrap();
        assert_eq!(profile.department.as_deref(), Some("Physics"));
    }

    #[test]
    fn profile_requires_display_name() {
        let err = UserProfile::new(Principal::new("aaaaa-aa"), "  ", "Physics").unwrap_err();
        assert_eq!(err.user_message(), "Please enter your name");
    }

    #[test]
    fn summary_rejects_unread_above_total() {
        assert!(NotificationSummary::new(5, 3).is_ok());
        assert_eq!(
            NotificationSummary::new(2, 3),
            Err(ValidationError::UnreadExceedsTotal { unread: 3, total: 2 })
        );
    }

    #[test]
    fn partition_preserves_gateway_order() {
        let list = vec![
            notification(5, false),
            notification(4, true),
            notification(3, false),
            notification(2, true),
        ];
        let partition = partition_notifications(&list);
        let unread: Vec<u64> = partition.unread.iter().map(|n| n.id.get()).collect();
        let read: Vec<u64> = partition.read.iter().map(|n| n.id.get()).collect();
        assert_eq!(unread, vec![5, 3]);
        assert_eq!(read, vec![4, 2]);
        assert_eq!(NotificationSummary::from_notifications(&list), NotificationSummary { total: 4, unread: 2 });
    }

    #[test]
    fn notification_uses_camel_case_on_the_wire() {
        let json = serde_json::to_value(notification(1, false)).unwrap();
        assert!(json.get("referenceId").is_some());
        assert!(json.get("isRead").is_some());
        assert!(json.get("createdTimestamp").is_some());
    }
}
