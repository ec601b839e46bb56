//! `GET /ws/{project_id}`: validate, upgrade, register, run both pumps.

use std::sync::Arc;

use axum::extract::rejection::PathRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use board_core::ProjectId;
use futures::StreamExt;
use tracing::{info, warn};

use super::connection::Connection;
use super::heartbeat::Heartbeat;
use super::pump::{self, InboundExit, OutboundExit};
use crate::error::HubError;
use crate::metrics as m;
use crate::server::AppState;

/// Upgrade handler.
///
/// The project id is checked before anything else, so a malformed id is
/// answered with `400` and no connection is ever created.
pub async fn ws_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let project_id = match parse_project_id(path) {
        Ok(id) => id,
        Err(e) => {
            metrics::counter!(m::WS_UPGRADE_REJECTIONS_TOTAL, "reason" => "project_id").increment(1);
            warn!(error = %e, "rejecting chat upgrade");
            return e.into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            metrics::counter!(m::WS_UPGRADE_REJECTIONS_TOTAL, "reason" => "handshake").increment(1);
            return rejection.into_response();
        }
    };

    // Held until the session ends so shutdown can wait for it.
    let session = state.sessions.token();
    let max = state.config.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| async move {
            serve_socket(socket, project_id, state).await;
            drop(session);
        })
}

fn parse_project_id(path: Result<Path<String>, PathRejection>) -> Result<ProjectId, HubError> {
    let Path(raw) = path.map_err(|e| HubError::BadRequest(e.body_text()))?;
    Ok(raw.parse::<ProjectId>()?)
}

/// Run one upgraded socket to completion.
async fn serve_socket(socket: WebSocket, project_id: ProjectId, state: AppState) {
    let registry = Arc::clone(&state.registry);
    let (conn, mailbox) = Connection::new(project_id, state.config.mailbox_capacity);

    // `register` refuses once shutdown has run `close_all`.
    if state.shutdown.is_triggered() || !registry.register(&conn) {
        conn.mark_closed();
        return;
    }
    metrics::counter!(m::WS_CONNECTIONS_TOTAL).increment(1);
    info!(
        conn_id = %conn.id(),
        project_id = %project_id,
        members = registry.member_count(project_id),
        "chat connection opened"
    );

    let heartbeat = Heartbeat::new(state.config.heartbeat_interval, state.config.heartbeat_timeout);
    let (sink, stream) = socket.split();
    let outbound = tokio::spawn(pump::run_outbound(
        sink,
        mailbox,
        Arc::clone(&conn),
        Arc::clone(&registry),
        heartbeat,
    ));
    let inbound = tokio::spawn(pump::run_inbound(stream, Arc::clone(&conn), Arc::clone(&registry)));

    let (outbound, inbound) = tokio::join!(outbound, inbound);
    // Both pumps unregister on exit; this covers a pump that panicked.
    let _ = registry.unregister(&conn);
    conn.mark_closed();

    let reason = match (&inbound, &outbound) {
        (Ok(InboundExit::Framing(_)), _) => "malformed_frame",
        (_, Ok(OutboundExit::HeartbeatExpired)) => "heartbeat_timeout",
        (Ok(InboundExit::Transport(_)), _) | (_, Ok(OutboundExit::Transport(_))) => "transport",
        (Ok(InboundExit::PeerClosed), _) => "peer_closed",
        (Ok(InboundExit::Closing), Ok(OutboundExit::Drained)) => "closed_by_hub",
        _ => "aborted",
    };
    metrics::counter!(m::WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    info!(
        conn_id = %conn.id(),
        project_id = %project_id,
        reason,
        duration_ms = u64::try_from(conn.age().as_millis()).unwrap_or(u64::MAX),
        "chat connection closed"
    );
}
