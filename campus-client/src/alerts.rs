//! Transient user-facing alerts (toasts).
//!
//! Alerts are advisory: nothing waits for acknowledgement, and each one
//! disappears once its display duration has elapsed.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_ALERT_DURATION: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub text: String,
    pub display_duration: Duration,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            display_duration: DEFAULT_ALERT_DURATION,
            created_at: Utc::now(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(AlertLevel::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(AlertLevel::Success, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, text)
    }

    pub fn with_duration(mut self, display_duration: Duration) -> Self {
        self.display_duration = display_duration;
        self
    }

    /// Alert announcing `delta` newly arrived notifications.
    pub fn new_notifications(delta: u64) -> Self {
        Self::info(new_notifications_text(delta))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.display_duration)
            .ok()
            .and_then(|span| self.created_at.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

pub fn new_notifications_text(delta: u64) -> String {
    let plural = if delta == 1 { "" } else { "s" };
    format!("You have {} new notification{}", delta, plural)
}

/// Anything that can surface an alert to the user.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: Alert);
}

/// Sink forwarding alerts to a channel consumed by the presentation loop.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    sender: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AlertSink for ChannelAlertSink {
    fn emit(&self, alert: Alert) {
        if self.sender.send(alert).is_err() {
            tracing::debug!("Alert dropped: presentation loop has stopped");
        }
    }
}

/// Visible alerts, oldest first.
#[derive(Debug, Default)]
pub struct AlertCenter {
    visible: Vec<Alert>,
}

impl AlertCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, alert: Alert) {
        self.visible.push(alert);
    }

    /// Remove expired alerts and return how many were dismissed.
    pub fn dismiss_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.visible.len();
        self.visible.retain(|alert| !alert.is_expired(now));
        before - self.visible.len()
    }

    pub fn visible(&self) -> &[Alert] {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_and_plural_wording() {
        assert_eq!(new_notifications_text(1), "You have 1 new notification");
        assert_eq!(new_notifications_text(2), "You have 2 new notifications");
        assert_eq!(new_notifications_text(17), "You have 17 new notifications");
    }

    #[test]
    fn new_notification_alert_is_info_with_default_duration() {
        let alert = Alert::new_notifications(3);
        assert_eq!(alert.level, AlertLevel::Info);
        assert_eq!(alert.display_duration, Duration::from_millis(5_000));
    }

    #[test]
    fn alert_center_dismisses_after_display_duration() {
        let mut center = AlertCenter::new();
        let alert = Alert::info("hello");
        let created = alert.created_at;
        center.push(alert);
        center.push(Alert::info("longer").with_duration(Duration::from_secs(60)));

        assert_eq!(center.dismiss_expired(created + chrono::Duration::milliseconds(4_999)), 0);
        assert_eq!(center.dismiss_expired(created + chrono::Duration::milliseconds(5_000)), 1);
        assert_eq!(center.visible().len(), 1);
        assert_eq!(center.visible()[0].text, "longer");
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelAlertSink::new();
        sink.emit(Alert::info("one"));
        sink.emit(Alert::error("two"));
        assert_eq!(rx.recv().await.unwrap().text, "one");
        assert_eq!(rx.recv().await.unwrap().level, AlertLevel::Error);
    }
}
