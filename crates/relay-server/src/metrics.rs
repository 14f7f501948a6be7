//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `GET /metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally (tests).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// Metric name constants shared across modules.

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Messages accepted by the submit path (counter).
pub const MESSAGES_SUBMITTED_TOTAL: &str = "messages_submitted_total";
/// Delivery jobs placed on the dispatch queue (counter).
pub const DELIVERY_JOBS_ENQUEUED_TOTAL: &str = "delivery_jobs_enqueued_total";
/// Delivery jobs written into an outbound buffer (counter).
pub const DELIVERIES_TOTAL: &str = "deliveries_total";
/// Delivery jobs dropped (counter, labels: reason).
pub const DELIVERY_DROPS_TOTAL: &str = "delivery_drops_total";
/// Connections unregistered by a dispatch worker (counter).
pub const CONNECTIONS_PRUNED_TOTAL: &str = "connections_pruned_total";
/// Messages durably saved (counter).
pub const PERSIST_SAVES_TOTAL: &str = "persist_saves_total";
/// Failed save attempts, retried or not (counter).
pub const PERSIST_ATTEMPT_FAILURES_TOTAL: &str = "persist_attempt_failures_total";
/// Messages dropped after the last attempt failed (counter).
pub const PERSIST_EXHAUSTED_TOTAL: &str = "persist_exhausted_total";
/// Messages abandoned by shutdown, mid-retry or still queued (counter).
pub const PERSIST_ABANDONED_TOTAL: &str = "persist_abandoned_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_renders() {
        let handle = detached_handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            MESSAGES_SUBMITTED_TOTAL,
            DELIVERY_JOBS_ENQUEUED_TOTAL,
            DELIVERIES_TOTAL,
            DELIVERY_DROPS_TOTAL,
            CONNECTIONS_PRUNED_TOTAL,
            PERSIST_SAVES_TOTAL,
            PERSIST_ATTEMPT_FAILURES_TOTAL,
            PERSIST_EXHAUSTED_TOTAL,
            PERSIST_ABANDONED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
