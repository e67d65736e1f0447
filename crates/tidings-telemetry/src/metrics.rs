//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::TelemetryError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections accepted total (counter).
pub const CONNECTIONS_TOTAL: &str = "subscription_connections_total";
/// Upgrade requests rejected by the origin check (counter).
pub const ORIGIN_REJECTED_TOTAL: &str = "subscription_origin_rejected_total";
/// Sessions abandoned because no `start` arrived in time (counter).
pub const START_TIMEOUTS_TOTAL: &str = "subscription_start_timeouts_total";
/// Sessions that currently exist (gauge).
pub const SESSIONS_ACTIVE: &str = "subscription_sessions_active";
/// Session lifetime in seconds (histogram, labels: reason).
pub const SESSION_DURATION_SECONDS: &str = "subscription_session_duration_seconds";
/// `data` messages sent (counter).
pub const DATA_MESSAGES_TOTAL: &str = "subscription_data_messages_total";
/// Distinct topic subscriptions made on the notifier (counter).
pub const TOPIC_SUBSCRIPTIONS_TOTAL: &str = "subscription_topic_subscriptions_total";
/// Notification payloads dropped because a session buffer was full (counter).
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "subscription_notifications_dropped_total";
