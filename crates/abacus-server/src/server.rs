//! Axum router and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use abacus_core::constants::SESSION_ID_HEADER;
use abacus_rpc::Dispatcher;
use abacus_settings::Environment;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::health::{self, HealthResponse};
use crate::multiplexer::SessionMultiplexer;
use crate::session::SessionStores;
use crate::shutdown::{DrainReport, ShutdownCoordinator, ShutdownPhase};
use crate::transport::allow_list::AllowListPolicy;
use crate::transport::{legacy, streamable};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session multiplexer.
    pub mux: Arc<SessionMultiplexer>,
    /// Host/origin policy.
    pub allow_list: Arc<AllowListPolicy>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Deployment environment.
    pub environment: Environment,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// State over a fresh multiplexer.
    pub fn new(config: &ServerConfig, dispatcher: Dispatcher, metrics: Option<PrometheusHandle>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new(config.grace_period));
        Self {
            mux: Arc::new(SessionMultiplexer::new(dispatcher, shutdown)),
            allow_list: Arc::new(config.allow_list.clone()),
            metrics,
            environment: config.environment,
            start_time: Instant::now(),
        }
    }
}

/// Build the router with every route and layer.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(streamable::post)
                .get(streamable::stream)
                .delete(streamable::delete),
        )
        .route("/sse", get(legacy::open))
        .route("/messages", post(legacy::post))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_ID_HEADER);
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origin
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT, session_header.clone()])
        .expose_headers([session_header])
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let operations = state.mux.dispatcher().context().operations.names();
    Json(health::health_check(
        state.start_time,
        state.mux.stores(),
        state.environment,
        operations,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    mux: Arc<SessionMultiplexer>,
    serve: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Session multiplexer.
    pub fn multiplexer(&self) -> &Arc<SessionMultiplexer> {
        &self.mux
    }

    /// Both session stores.
    pub fn stores(&self) -> &SessionStores {
        self.mux.stores()
    }

    /// Shutdown coordinator.
    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        self.mux.shutdown()
    }

    /// Drain every session. The listener keeps answering (new sessions get
    /// `503`) until the drain reaches `Terminated`.
    pub async fn drain(&self) -> DrainReport {
        self.mux.shutdown().drain(self.mux.stores()).await
    }

    /// Wait for the serve task to finish.
    pub async fn stopped(self) -> Result<()> {
        self.serve.await??;
        Ok(())
    }
}

/// Bind the listener and serve until a drain terminates.
pub async fn start(
    config: ServerConfig,
    dispatcher: Dispatcher,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle> {
    let state = AppState::new(&config, dispatcher, metrics);
    let mux = Arc::clone(&state.mux);
    let app = build_router(state, &config);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    let mut phase = mux.shutdown().subscribe();
    let serve = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = phase.wait_for(|p| *p == ShutdownPhase::Terminated).await;
            })
            .await
    });

    info!(
        %addr,
        environment = config.environment.as_str(),
        allow_list = config.allow_list.is_enforced(),
        "abacus server listening"
    );
    Ok(ServerHandle { addr, mux, serve })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26","capabilities":{},"clientInfo":{"name":"t","version":"0"}}}"#;

    fn app_with(config: &ServerConfig) -> (Router, AppState) {
        let state = AppState::new(config, Dispatcher::default(), None);
        (build_router(state.clone(), config), state)
    }

    fn app() -> (Router, AppState) {
        app_with(&ServerConfig::default())
    }

    fn mcp_post(body: &str, session: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream");
        if let Some(id) = session {
            builder = builder.header(SESSION_ID_HEADER, id);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn initialize(app: &Router) -> String {
        let resp = app.clone().oneshot(mcp_post(INIT, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.headers()[SESSION_ID_HEADER].to_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn health_reports_sessions_and_operations() {
        let (app, _state) = app();
        let _id = initialize(&app).await;

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["activeSessions"]["streamable"], 1);
        assert_eq!(body["activeSessions"]["sse"], 0);
        assert_eq!(body["environment"], "test");
        assert_eq!(body["operations"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn initialize_returns_session_header_and_server_info() {
        let (app, state) = app();
        let resp = app.oneshot(mcp_post(INIT, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let id = resp.headers()[SESSION_ID_HEADER].to_str().unwrap().to_owned();
        let body = json_body(resp).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(body["result"]["serverInfo"]["name"], "advanced-calculator-server");
        assert!(state.mux.resolve(crate::session::TransportKind::Streamable, &id).is_some());
    }

    #[tokio::test]
    async fn request_without_session_is_400() {
        let (app, state) = app();
        let resp = app
            .oneshot(mcp_post(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(state.mux.stores().total(), 0);
    }

    #[tokio::test]
    async fn tool_call_on_session() {
        let (app, _state) = app();
        let id = initialize(&app).await;
        let call = json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {"name": "add", "arguments": {"a": 15, "b": 25}}
        });
        let resp = app
            .oneshot(mcp_post(&call.to_string(), Some(id.as_str())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let text = body["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["result"], 40);
        assert_eq!(payload["operation"], "addition");
    }

    #[tokio::test]
    async fn notification_only_is_202() {
        let (app, _state) = app();
        let id = initialize(&app).await;
        let resp = app
            .oneshot(mcp_post(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                Some(id.as_str()),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn reinitialize_is_invalid_request() {
        let (app, _state) = app();
        let id = initialize(&app).await;
        let resp = app.oneshot(mcp_post(INIT, Some(id.as_str()))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let (app, _state) = app();
        let resp = app.oneshot(mcp_post("{not json", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn wrong_content_type_is_415() {
        let (app, _state) = app();
        let req = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "text/plain")
            .body(Body::from(INIT))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let config = ServerConfig {
            max_body_bytes: 64,
            ..ServerConfig::default()
        };
        let (app, _state) = app_with(&config);
        let resp = app.oneshot(mcp_post(INIT, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn delete_closes_session() {
        let (app, state) = app();
        let id = initialize(&app).await;
        let req = Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_ID_HEADER, &id)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.mux.stores().streamable.len(), 0);

        let resp = app
            .oneshot(mcp_post(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#, Some(id.as_str())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn legacy_post_missing_vs_unknown() {
        let (app, _state) = app();
        let legacy_post = |uri: &str| {
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                .unwrap()
        };
        let missing = app.clone().oneshot(legacy_post("/messages")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        let unknown = app.oneshot(legacy_post("/messages?sessionId=nope")).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn draining_refuses_initialize_with_503() {
        let (app, state) = app();
        let _ = state.mux.shutdown().drain(state.mux.stores()).await;
        let resp = app.clone().oneshot(mcp_post(INIT, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn allow_list_rejects_foreign_host() {
        let config = ServerConfig {
            allow_list: AllowListPolicy::enforced(vec!["localhost".into()], vec![]),
            ..ServerConfig::default()
        };
        let (app, state) = app_with(&config);
        let mut req = mcp_post(INIT, None);
        let _ = req
            .headers_mut()
            .insert("host", HeaderValue::from_static("evil.example"));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.mux.stores().total(), 0);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let (app, _state) = app();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (app, _state) = app();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_binds_and_stops_after_drain() {
        let handle = start(ServerConfig::default(), Dispatcher::default(), None)
            .await
            .unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        let report = handle.drain().await;
        assert_eq!(report.exit_code(), 0);
        handle.stopped().await.unwrap();
    }
}
