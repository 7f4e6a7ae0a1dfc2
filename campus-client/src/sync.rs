//! Unread-count tracking for new-notification alerts.
//!
//! [`observe`] is the whole decision: given the last unread count seen in this
//! session and a freshly fetched summary, it returns the next baseline and the
//! size of the increase to announce, if any. [`NotificationSync`] owns the
//! baseline for one authenticated session and turns increases into alerts.
//!
//! Rules:
//! - no identity or no summary: nothing changes;
//! - first summary of a session only sets the baseline;
//! - a higher unread count produces one alert for the whole difference;
//! - an equal or lower count silently moves the baseline.

use crate::alerts::Alert;
use crate::gateway::GatewayError;
use campus_core::NotificationSummary;
use std::time::Duration;

/// Outcome of one decision step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub baseline: Option<u64>,
    /// Number of newly arrived unread notifications to announce.
    pub new_unread: Option<u64>,
}

pub fn observe(
    previous: Option<u64>,
    summary: Option<&NotificationSummary>,
    is_authenticated: bool,
) -> Observation {
    let unread = match summary {
        Some(summary) if is_authenticated => summary.unread,
        _ => {
            return Observation {
                baseline: previous,
                new_unread: None,
            }
        }
    };

    let new_unread = match previous {
        Some(baseline) if unread > baseline => Some(unread - baseline),
        _ => None,
    };
    Observation {
        baseline: Some(unread),
        new_unread,
    }
}

/// What a summary refresh produced, as seen by the sync core.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryUpdate {
    Fresh(NotificationSummary),
    /// The refresh produced no value of its own (coalesced or discarded).
    NoChange,
    Failed(GatewayError),
}

/// Per-session unread baseline and alert policy.
#[derive(Debug)]
pub struct NotificationSync {
    baseline: Option<u64>,
    alert_duration: Duration,
    failed_refreshes: u64,
}

impl NotificationSync {
    pub fn new(alert_duration: Duration) -> Self {
        Self {
            baseline: None,
            alert_duration,
            failed_refreshes: 0,
        }
    }

    pub fn baseline(&self) -> Option<u64> {
        self.baseline
    }

    /// Failed summary refreshes since the session began.
    pub fn failed_refreshes(&self) -> u64 {
        self.failed_refreshes
    }

    /// Forget the baseline; the next observation starts a new session.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.failed_refreshes = 0;
    }

    pub fn observe(
        &mut self,
        summary: Option<&NotificationSummary>,
        is_authenticated: bool,
    ) -> Option<Alert> {
        let observation = observe(self.baseline, summary, is_authenticated);
        if observation.baseline != self.baseline {
            tracing::debug!(
                previous = ?self.baseline,
                baseline = ?observation.baseline,
                "Unread baseline moved"
            );
        }
        self.baseline = observation.baseline;

        observation.new_unread.map(|delta| {
            tracing::info!(delta, unread = ?self.baseline, "New notifications arrived");
            Alert::new_notifications(delta).with_duration(self.alert_duration)
        })
    }

    /// Apply a refresh outcome. Failures never move the baseline.
    pub fn apply(&mut self, update: SummaryUpdate, is_authenticated: bool) -> Option<Alert> {
        match update {
            SummaryUpdate::Fresh(summary) => self.observe(Some(&summary), is_authenticated),
            SummaryUpdate::NoChange => None,
            SummaryUpdate::Failed(error) => {
                self.failed_refreshes += 1;
                tracing::warn!(
                    error = %error,
                    failures = self.failed_refreshes,
                    baseline = ?self.baseline,
                    "Notification summary refresh failed; keeping baseline"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertLevel;
    use proptest::prelude::*;

    fn summary(total: u64, unread: u64) -> NotificationSummary {
        NotificationSummary { total, unread }
    }

    fn sync_with_baseline(baseline: u64) -> NotificationSync {
        let mut sync = NotificationSync::new(Duration::from_millis(5_000));
        sync.observe(Some(&summary(baseline, baseline)), true);
        sync
    }

    #[test]
    fn first_observation_sets_baseline_without_alert() {
        let mut sync = NotificationSync::new(Duration::from_millis(5_000));
        assert!(sync.observe(Some(&summary(5, 3)), true).is_none());
        assert_eq!(sync.baseline(), Some(3));
    }

    #[test]
    fn increase_alerts_with_delta() {
        let mut sync = sync_with_baseline(3);
        let alert = sync.observe(Some(&summary(7, 5)), true).unwrap();
        assert_eq!(alert.text, "You have 2 new notifications");
        assert_eq!(alert.level, AlertLevel::Info);
        assert_eq!(alert.display_duration, Duration::from_millis(5_000));
        assert_eq!(sync.baseline(), Some(5));
    }

    #[test]
    fn decrease_moves_baseline_silently() {
        let mut sync = sync_with_baseline(5);
        assert!(sync.observe(Some(&summary(7, 1)), true).is_none());
        assert_eq!(sync.baseline(), Some(1));
    }

    #[test]
    fn reset_suppresses_alert_after_reauthentication() {
        let mut sync = sync_with_baseline(5);
        assert!(sync.observe(None, false).is_none());
        sync.reset();
        assert_eq!(sync.baseline(), None);
        assert!(sync.observe(Some(&summary(7, 5)), true).is_none());
        assert_eq!(sync.baseline(), Some(5));
    }

    #[test]
    fn single_new_notification_uses_singular() {
        let mut sync = sync_with_baseline(1);
        let alert = sync.observe(Some(&summary(8, 2)), true).unwrap();
        assert_eq!(alert.text, "You have 1 new notification");
        assert_eq!(sync.baseline(), Some(2));
    }

    #[test]
    fn unauthenticated_or_absent_summary_is_ignored() {
        let mut sync = sync_with_baseline(4);
        assert!(sync.observe(Some(&summary(9, 9)), false).is_none());
        assert!(sync.observe(None, true).is_none());
        assert_eq!(sync.baseline(), Some(4));
    }

    #[test]
    fn failed_refresh_keeps_baseline() {
        let mut sync = sync_with_baseline(4);
        let alert = sync.apply(
            SummaryUpdate::Failed(GatewayError::Unavailable("timeout".to_string())),
            true,
        );
        assert!(alert.is_none());
        assert_eq!(sync.baseline(), Some(4));
        assert_eq!(sync.failed_refreshes(), 1);

        assert!(sync.apply(SummaryUpdate::NoChange, true).is_none());
        assert_eq!(sync.baseline(), Some(4));
    }

    #[test]
    fn configured_duration_is_used() {
        let mut sync = NotificationSync::new(Duration::from_secs(2));
        sync.observe(Some(&summary(0, 0)), true);
        let alert = sync.observe(Some(&summary(1, 1)), true).unwrap();
        assert_eq!(alert.display_duration, Duration::from_secs(2));
    }

    proptest! {
        #[test]
        fn first_observation_never_alerts(unread in 0u64..10_000, extra in 0u64..100) {
            let obs = observe(None, Some(&summary(unread + extra, unread)), true);
            prop_assert_eq!(obs, Observation { baseline: Some(unread), new_unread: None });
        }

        #[test]
        fn alerts_exactly_on_increase(prev in 0u64..10_000, next in 0u64..10_000) {
            let obs = observe(Some(prev), Some(&summary(next, next)), true);
            prop_assert_eq!(obs.baseline, Some(next));
            if next > prev {
                prop_assert_eq!(obs.new_unread, Some(next - prev));
            } else {
                prop_assert_eq!(obs.new_unread, None);
            }
        }

        #[test]
        fn unauthenticated_is_identity(prev in proptest::option::of(0u64..10_000), unread in 0u64..10_000) {
            let obs = observe(prev, Some(&summary(unread, unread)), false);
            prop_assert_eq!(obs, Observation { baseline: prev, new_unread: None });
        }

        #[test]
        fn deltas_over_a_session_sum_to_net_rise(counts in prop::collection::vec(0u64..50, 1..30)) {
            // Sum of announced deltas equals the sum of every upward step.
            let mut baseline = None;
            let mut announced = 0u64;
            for unread in &counts {
                let obs = observe(baseline, Some(&summary(*unread, *unread)), true);
                announced += obs.new_unread.unwrap_or(0);
                baseline = obs.baseline;
            }
            let rises: u64 = counts
                .windows(2)
                .map(|w| w[1].saturating_sub(w[0]))
                .sum();
            prop_assert_eq!(announced, rises);
            prop_assert_eq!(baseline, counts.last().copied());
        }
    }
}
