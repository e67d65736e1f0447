//! `SubscriptionServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::header::{CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tidings_telemetry::metrics::{ORIGIN_REJECTED_TOTAL, render};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::handler::SubscriptionHandler;
use crate::health::{self, HealthResponse};
use crate::session::SessionState;
use crate::shutdown::ShutdownCoordinator;

/// WebSocket subprotocol spoken on the subscription route.
pub const SUBPROTOCOL: &str = "graphql-ws";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session handler.
    pub handler: Arc<SubscriptionHandler>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

/// HTTP server exposing the subscription route, `/health` and `/metrics`.
pub struct SubscriptionServer {
    config: ServerConfig,
    handler: Arc<SubscriptionHandler>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl SubscriptionServer {
    /// Create a server. Sessions served by `handler` end when the server
    /// shuts down.
    pub fn new(config: ServerConfig, handler: SubscriptionHandler) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let handler = handler.with_shutdown(shutdown.token());
        Self {
            config,
            handler: Arc::new(handler),
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve Prometheus text at `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            handler: self.handler.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route(&self.config.path, get(subscription_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in a background task until shutdown is signalled.
    ///
    /// Returns the bound address and the serving task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), std::io::Error> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(%addr, path = %self.config.path, "subscription server listening");
        Ok((addr, handle))
    }

    /// Session handler.
    pub fn handler(&self) -> &Arc<SubscriptionHandler> {
        &self.handler
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET {path}: origin check, then WebSocket upgrade.
async fn subscription_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.handler.config().origin_check.accepts(&headers) {
        counter!(ORIGIN_REJECTED_TOTAL).increment(1);
        warn!(origin = ?headers.get(ORIGIN), "rejected websocket origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let origin = headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let handler = state.handler.clone();
    ws.protocols([SUBPROTOCOL])
        .max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = handler.serve_websocket(socket, origin).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.handler.connections();
    Json(health::health_check(
        state.start_time,
        connections.count(),
        connections.count_in(SessionState::Streaming),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriptionConfig;
    use crate::origin::OriginCheck;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tidings_core::{ExecutionContext, ExecutionResult, Executor, SubscriptionRequest};
    use tidings_notify::LocalNotifier;
    use tower::ServiceExt;

    struct NullExecutor;

    impl Executor for NullExecutor {
        fn execute(&self, _request: &SubscriptionRequest, _ctx: &ExecutionContext<'_>) -> ExecutionResult {
            ExecutionResult::ok(Value::Null)
        }
    }

    fn make_server(config: SubscriptionConfig) -> SubscriptionServer {
        let handler = SubscriptionHandler::new(
            Arc::new(NullExecutor),
            Arc::new(LocalNotifier::new()),
            config,
        );
        SubscriptionServer::new(ServerConfig::default(), handler)
    }

    fn upgrade_request(origin: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/subscriptions")
            .header("host", "localhost:8080")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .header("sec-websocket-protocol", SUBPROTOCOL);
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let app = make_server(SubscriptionConfig::default()).router();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["streaming"], 0);
        assert!(json["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn rejected_origin_gets_403() {
        let config = SubscriptionConfig {
            origin_check: OriginCheck::allow_list(["https://app.example"]),
            ..SubscriptionConfig::default()
        };
        let app = make_server(config).router();
        let resp = app
            .oneshot(upgrade_request(Some("https://evil.example")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn plain_get_without_upgrade_is_rejected() {
        let app = make_server(SubscriptionConfig::default()).router();
        let resp = app
            .oneshot(Request::builder().uri("/subscriptions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn metrics_without_handle_is_404() {
        let app = make_server(SubscriptionConfig::default()).router();
        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_handle_renders_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let app = make_server(SubscriptionConfig::default())
            .with_metrics(handle)
            .router();
        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server(SubscriptionConfig::default()).router();
        let resp = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_and_shutdown() {
        let server = make_server(SubscriptionConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
