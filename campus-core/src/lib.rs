//! Campus Core - Entity Types
//!
//! Pure data structures shared by the client crates. Validation of form input
//! lives next to the types it produces; there is no I/O here.

pub mod entities;
pub mod error;
pub mod identity;

pub use entities::{
    partition_notifications, Announcement, NewAnnouncement, Notification, NotificationPartition,
    NotificationSummary, UserProfile,
};
pub use error::{ValidationError, ValidationResult};
pub use identity::{AnnouncementId, NotificationId, Principal, Timestamp};
