//! Campus client entry point.
//!
//! Runs headless: signs in with the configured principal, keeps the
//! notification poller going, and logs alerts as they surface.

use campus_client::alerts::{Alert, AlertCenter, ChannelAlertSink};
use campus_client::api_client::RestGateway;
use campus_client::cache::QueryCache;
use campus_client::config::ClientConfig;
use campus_client::error::AppError;
use campus_client::nav::{self, Route};
use campus_client::poller::{spawn_notification_poller, PollerConfig};
use campus_client::queries::Queries;
use campus_client::session::Session;
use campus_client::telemetry::init_tracing;
use campus_client::views::{unread_badge, DashboardView};
use campus_core::Principal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const ALERT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ClientConfig::load()?;
    init_tracing(config.log_format)?;

    let gateway = Arc::new(RestGateway::new(&config)?);
    let cache = Arc::new(QueryCache::new());
    let session = Session::new(Arc::clone(&cache));
    let (sink, alert_rx) = ChannelAlertSink::new();
    let sink = Arc::new(sink);
    let queries = Queries::new(gateway, Arc::clone(&cache), session.clone(), sink.clone());

    let poller = spawn_notification_poller(queries.clone(), sink, PollerConfig::from(&config));

    match &config.auth.principal {
        Some(principal) => session.sign_in(Principal::new(principal.trim())),
        None => session.mark_anonymous(),
    }
    if let Err(err) = show_landing(&queries).await {
        tracing::warn!(error = %err, "Initial load failed");
    }

    let alert_task = tokio::spawn(run_alert_loop(alert_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    session.sign_out();
    let metrics = poller.shutdown().await;
    alert_task.abort();
    tracing::info!(
        ticks = metrics.ticks,
        alerts_emitted = metrics.alerts_emitted,
        refresh_failures = metrics.refresh_failures,
        "Client stopped"
    );
    Ok(())
}

async fn show_landing(queries: &Queries) -> Result<(), AppError> {
    let state = queries.session().state();
    if let Some(redirect) = nav::guard(Route::Dashboard, &state) {
        tracing::info!(route = %redirect, "Not signed in");
        return Ok(());
    }

    let profile = queries.caller_profile().await?;
    if nav::needs_profile_setup(&state, Some(&profile)) {
        tracing::info!(route = %Route::Profile, "Profile setup required");
        return Ok(());
    }

    let announcements = queries.announcements().await?;
    let summary = queries.notifications_summary().await?;
    let dashboard = DashboardView::build(profile.as_ref(), &announcements, Some(&summary));
    tracing::info!(
        greeting = %dashboard.greeting,
        announcements = dashboard.total_announcements,
        unread = ?unread_badge(Some(&summary)),
        "Dashboard loaded"
    );
    for announcement in dashboard.recent {
        tracing::info!(id = %announcement.id, title = %announcement.title, "Recent announcement");
    }
    Ok(())
}

async fn run_alert_loop(mut alerts: mpsc::UnboundedReceiver<Alert>) {
    let mut center = AlertCenter::new();
    let mut sweep = tokio::time::interval(ALERT_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            alert = alerts.recv() => {
                let Some(alert) = alert else { break };
                tracing::info!(level = ?alert.level, "{}", alert.text);
                center.push(alert);
            }
            _ = sweep.tick() => {
                let dismissed = center.dismiss_expired(chrono::Utc::now());
                if dismissed > 0 {
                    tracing::debug!(dismissed, visible = center.visible().len(), "Alerts expired");
                }
            }
        }
    }
}
