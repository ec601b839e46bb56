//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup, before anything is recorded. Returns the handle
/// that renders `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket sessions registered (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions ended (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Registered WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Inbound frames that failed to decode (counter).
pub const WS_FRAMING_ERRORS_TOTAL: &str = "ws_framing_errors_total";
/// Members evicted for a full mailbox (counter).
pub const WS_BROADCAST_EVICTIONS_TOTAL: &str = "ws_broadcast_evictions_total";
/// Upgrade requests refused before a session existed (counter, labels: reason).
pub const WS_UPGRADE_REJECTIONS_TOTAL: &str = "ws_upgrade_rejections_total";
/// Chat messages fanned out (counter).
pub const CHAT_MESSAGES_BROADCAST_TOTAL: &str = "chat_messages_broadcast_total";
/// Channels with at least one member (gauge).
pub const CHAT_CHANNELS_ACTIVE: &str = "chat_channels_active";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(WS_CONNECTIONS_TOTAL).increment(2);
            metrics::gauge!(CHAT_CHANNELS_ACTIVE).set(1.0);
        });
        let output = render(&handle);
        assert!(output.contains("ws_connections_total 2"));
        assert!(output.contains("chat_channels_active"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_FRAMING_ERRORS_TOTAL,
            WS_BROADCAST_EVICTIONS_TOTAL,
            WS_UPGRADE_REJECTIONS_TOTAL,
            CHAT_MESSAGES_BROADCAST_TOTAL,
            CHAT_CHANNELS_ACTIVE,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name}"
            );
        }
    }
}
