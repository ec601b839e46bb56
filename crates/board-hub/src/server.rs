//! `HubServer`: axum router, listener, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use board_core::ProjectId;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::HubConfig;
use crate::cors::cors_layer;
use crate::error::HubError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::Registry;
use crate::websocket::upgrade::ws_handler;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Channel membership.
    pub registry: Arc<Registry>,
    /// Runtime configuration.
    pub config: Arc<HubConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Upgraded chat sessions still running.
    pub sessions: TaskTracker,
}

/// Body of `GET /ws/{project_id}/members`.
#[derive(Debug, Clone, Serialize)]
pub struct MembersResponse {
    /// The channel asked about.
    pub project_id: ProjectId,
    /// Live members in it.
    pub members: usize,
}

/// The chat hub server.
pub struct HubServer {
    config: Arc<HubConfig>,
    registry: Arc<Registry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    sessions: TaskTracker,
}

/// A running listener.
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address actually bound.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The serve task, for shutdown bookkeeping. It finishes only after every
    /// upgraded chat session has ended.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

impl HubServer {
    /// Create a server with an empty registry.
    pub fn new(config: HubConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Registry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
            sessions: TaskTracker::new(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            sessions: self.sessions.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/{project_id}", get(ws_handler))
            .route("/ws/{project_id}/members", get(members_handler))
            .with_state(state)
            .layer(cors_layer(self.config.allowed_origin_prefixes.clone()))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and start serving in the background.
    ///
    /// When the shutdown coordinator fires, the listener stops accepting and
    /// every chat connection is closed. Upgraded sessions outlive the HTTP
    /// connection that carried them, so the serve task also waits for them.
    pub async fn listen(&self) -> Result<ServerHandle, HubError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| HubError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;

        let router = self.router();
        let shutdown = Arc::clone(&self.shutdown);
        let registry = Arc::clone(&self.registry);
        let sessions = self.sessions.clone();
        let stop = async move {
            shutdown.triggered().await;
            let _ = registry.close_all();
        };
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(stop).await {
                error!(error = %e, "server stopped with error");
            }
            let _ = sessions.close();
            sessions.wait().await;
        });

        info!(addr = %local, "chat hub listening");
        Ok(ServerHandle { addr: local, task })
    }

    /// Channel membership.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Runtime configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Tracker for upgraded chat sessions.
    pub fn sessions(&self) -> &TaskTracker {
        &self.sessions
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.registry.channel_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws/{project_id}/members
async fn members_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<MembersResponse>, HubError> {
    let project_id: ProjectId = raw.parse()?;
    Ok(Json(MembersResponse {
        project_id,
        members: state.registry.member_count(project_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use crate::websocket::connection::Connection;

    fn make_server() -> HubServer {
        HubServer::new(HubConfig::local())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.registry().connection_count(), 0);
        assert!(!server.shutdown().is_triggered());
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let server = make_server();
        let (conn, _rx) = Connection::new(ProjectId::new(1), 4);
        assert!(server.registry().register(&conn));

        let (status, json) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 1);
        assert_eq!(json["channels"], 1);
    }

    #[tokio::test]
    async fn members_endpoint_counts_channel() {
        let server = make_server();
        let (a, _ra) = Connection::new(ProjectId::new(42), 4);
        let (b, _rb) = Connection::new(ProjectId::new(42), 4);
        assert!(server.registry().register(&a));
        assert!(server.registry().register(&b));

        let (status, json) = get_json(server.router(), "/ws/42/members").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["project_id"], 42);
        assert_eq!(json["members"], 2);

        let (_, json) = get_json(server.router(), "/ws/7/members").await;
        assert_eq!(json["members"], 0);
    }

    #[tokio::test]
    async fn members_endpoint_rejects_bad_id() {
        let (status, _) = get_json(make_server().router(), "/ws/abc/members").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upgrade_with_bad_id_is_rejected_before_handshake() {
        let server = make_server();
        let req = Request::builder()
            .uri("/ws/not-a-number")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert_eq!(&body[..], b"Invalid project ID");
        assert_eq!(server.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn plain_get_on_ws_route_is_client_error() {
        let server = make_server();
        let req = Request::builder().uri("/ws/42").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_eq!(server.registry().channel_count(), 0);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let (status, _) = get_json(make_server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get_json(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_allows_localhost_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap();
        let resp = make_server().router().oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        let methods = resp
            .headers()
            .get("access-control-allow-methods")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("DELETE"));
    }

    #[tokio::test]
    async fn cors_ignores_foreign_origin() {
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = make_server().router().oneshot(req).await.unwrap();
        assert!(resp.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.addr().port(), 0);

        let (conn, _rx) = Connection::new(ProjectId::new(1), 4);
        assert!(server.registry().register(&conn));

        let task = handle.into_task();
        assert!(
            server
                .shutdown()
                .drain(vec![task], Some(std::time::Duration::from_secs(5)))
                .await
        );
        assert_eq!(server.registry().connection_count(), 0);
        assert!(conn.is_closing());
        assert!(server.sessions().is_closed());
    }

    #[tokio::test]
    async fn shutdown_waits_for_running_sessions() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        let session = server.sessions().token();

        let task = handle.into_task();
        let shutdown = Arc::clone(server.shutdown());
        let waiter = tokio::spawn(async move {
            shutdown
                .drain(vec![task], Some(std::time::Duration::from_secs(5)))
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(session);
        assert!(waiter.await.unwrap());
        assert!(server.sessions().is_empty());
    }

    #[tokio::test]
    async fn stuck_session_times_out_shutdown() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        let _session = server.sessions().token();
        assert!(
            !server
                .shutdown()
                .drain(vec![handle.into_task()], Some(std::time::Duration::from_millis(100)))
                .await
        );
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let first = make_server();
        let handle = first.listen().await.unwrap();

        let mut cfg = HubConfig::local();
        cfg.port = handle.addr().port();
        let err = HubServer::new(cfg).listen().await.err().unwrap();
        assert!(matches!(err, HubError::Bind { .. }));
        first.shutdown().trigger();
    }
}
