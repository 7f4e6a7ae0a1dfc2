//! Background notification poller.
//!
//! One supervisor task per client. While a session is signed in it keeps a
//! single interval timer that invalidates and refetches the notification
//! summary and list; while signed out there is no timer at all. Summary
//! refreshes, whoever triggered them, arrive as cache events and are fed to
//! the session's [`NotificationSync`], so decisions are serialized on this
//! task.
//!
//! Session transitions are handled before cache events and ticks, so a
//! sign-out always clears the baseline before anything else is observed.

use crate::alerts::AlertSink;
use crate::cache::{CacheEvent, QueryKey};
use crate::queries::Queries;
use crate::session::{AuthState, SessionId};
use crate::sync::{NotificationSync, SummaryUpdate};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10_000);

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between refreshes while signed in (default: 10 seconds)
    pub interval: Duration,
    /// How long new-notification alerts stay visible (default: 5 seconds)
    pub alert_duration: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            alert_duration: crate::alerts::DEFAULT_ALERT_DURATION,
        }
    }
}

impl From<&crate::config::ClientConfig> for PollerConfig {
    fn from(config: &crate::config::ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            alert_duration: config.alert_duration(),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct PollerMetrics {
    pub sessions_started: AtomicU64,
    pub ticks: AtomicU64,
    pub summaries_observed: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub alerts_emitted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerMetricsSnapshot {
    pub sessions_started: u64,
    pub ticks: u64,
    pub summaries_observed: u64,
    pub refresh_failures: u64,
    pub alerts_emitted: u64,
}

impl PollerMetrics {
    pub fn snapshot(&self) -> PollerMetricsSnapshot {
        PollerMetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            summaries_observed: self.summaries_observed.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// HANDLE
// ============================================================================

pub struct NotificationPoller {
    shutdown: watch::Sender<bool>,
    active: watch::Receiver<bool>,
    metrics: Arc<PollerMetrics>,
    handle: JoinHandle<()>,
}

impl NotificationPoller {
    /// Whether a poll timer is currently running.
    pub fn is_polling(&self) -> bool {
        *self.active.borrow()
    }

    /// Watch the polling flag.
    pub fn polling_state(&self) -> watch::Receiver<bool> {
        self.active.clone()
    }

    pub fn metrics(&self) -> PollerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the supervisor and wait for it to exit.
    pub async fn shutdown(self) -> PollerMetricsSnapshot {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "Notification poller task failed");
        }
        self.metrics.snapshot()
    }
}

/// Start the notification poller for `queries`' session.
pub fn spawn_notification_poller(
    queries: Queries,
    alerts: Arc<dyn AlertSink>,
    config: PollerConfig,
) -> NotificationPoller {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (active_tx, active_rx) = watch::channel(false);
    let metrics = Arc::new(PollerMetrics::default());

    let auth_rx = queries.session().subscribe();
    let cache_rx = queries.cache().subscribe();
    let task = PollerTask {
        sync: NotificationSync::new(config.alert_duration),
        config,
        queries,
        alerts,
        metrics: Arc::clone(&metrics),
        active: active_tx,
        session: None,
        ticker: None,
    };
    let handle = tokio::spawn(task.run(auth_rx, cache_rx, shutdown_rx));

    NotificationPoller {
        shutdown: shutdown_tx,
        active: active_rx,
        metrics,
        handle,
    }
}

// ============================================================================
// TASK
// ============================================================================

struct PollerTask {
    config: PollerConfig,
    queries: Queries,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<PollerMetrics>,
    active: watch::Sender<bool>,
    sync: NotificationSync,
    /// The session being polled, if any.
    session: Option<SessionId>,
    ticker: Option<Interval>,
}

impl PollerTask {
    async fn run(
        mut self,
        mut auth_rx: watch::Receiver<AuthState>,
        mut cache_rx: broadcast::Receiver<CacheEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Notification poller started"
        );

        let initial = auth_rx.borrow_and_update().clone();
        self.on_auth_change(&initial);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Session dropped; stopping poller");
                        break;
                    }
                    let state = auth_rx.borrow_and_update().clone();
                    self.on_auth_change(&state);
                }

                event = cache_rx.recv() => {
                    match event {
                        Ok(event) => {
                            let current = auth_rx.borrow().session();
                            self.on_cache_event(event, current);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Poller lagged behind cache events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                _ = next_tick(&mut self.ticker) => {
                    self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
                    self.spawn_refresh();
                }
            }
        }

        self.end_session();
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            sessions_started = snapshot.sessions_started,
            ticks = snapshot.ticks,
            alerts_emitted = snapshot.alerts_emitted,
            refresh_failures = snapshot.refresh_failures,
            "Notification poller stopped"
        );
    }

    fn on_auth_change(&mut self, state: &AuthState) {
        let next = state.session();
        if next == self.session {
            return;
        }
        self.end_session();
        if let Some(session) = next {
            self.begin_session(session);
        }
    }

    fn begin_session(&mut self, session: SessionId) {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        self.session = Some(session);
        self.metrics.sessions_started.fetch_add(1, Ordering::Relaxed);
        self.active.send_replace(true);
        tracing::debug!(session = %session, "Notification polling active");

        // Establish the baseline now rather than one interval from now.
        self.spawn_refresh();
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = %session, "Notification polling stopped");
        }
        self.ticker = None;
        self.sync.reset();
        self.active.send_replace(false);
    }

    fn on_cache_event(&mut self, event: CacheEvent, current: Option<SessionId>) {
        if event.key() != &QueryKey::NotificationsSummary {
            return;
        }
        let update = match event {
            CacheEvent::Updated { .. } => match self.queries.cache().summary() {
                Some(summary) => SummaryUpdate::Fresh(summary),
                None => SummaryUpdate::NoChange,
            },
            CacheEvent::Failed { error, .. } => {
                self.metrics.refresh_failures.fetch_add(1, Ordering::Relaxed);
                SummaryUpdate::Failed(error)
            }
        };
        if matches!(update, SummaryUpdate::Fresh(_)) {
            self.metrics.summaries_observed.fetch_add(1, Ordering::Relaxed);
        }

        let in_session = current.is_some() && current == self.session;
        if let Some(alert) = self.sync.apply(update, in_session) {
            self.metrics.alerts_emitted.fetch_add(1, Ordering::Relaxed);
            self.alerts.emit(alert);
        }
    }

    fn spawn_refresh(&self) {
        let queries = self.queries.clone();
        tokio::spawn(async move {
            tokio::join!(
                queries.invalidate_and_refetch(QueryKey::NotificationsSummary),
                queries.invalidate_and_refetch(QueryKey::Notifications),
            );
        });
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_polls_every_ten_seconds() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.alert_duration, Duration::from_secs(5));
    }

    #[test]
    fn metrics_snapshot_reads_counters() {
        let metrics = PollerMetrics::default();
        metrics.ticks.store(4, Ordering::Relaxed);
        metrics.alerts_emitted.store(2, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks, 4);
        assert_eq!(snapshot.alerts_emitted, 2);
        assert_eq!(snapshot.refresh_failures, 0);
    }
}
