// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::models::HostInfo;

pub use ws::WebSocketSink;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: watch::Receiver<Arc<AppConfig>>,
    pub(crate) host_info: Arc<HostInfo>,
    pub(crate) active_sessions: Arc<AtomicUsize>,
}

pub fn app(
    config: watch::Receiver<Arc<AppConfig>>,
    host_info: Arc<HostInfo>,
    active_sessions: Arc<AtomicUsize>,
) -> Router {
    let state = AppState {
        config,
        host_info,
        active_sessions,
    };
    Router::new()
        .route("/", get(|| async { "hostpulse telemetry agent" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/info", get(http::api_info_handler)) // GET /api/info
        .route("/ws/stats", get(ws::ws_stats)) // WS /ws/stats?interval=&duration=
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
