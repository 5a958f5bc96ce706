//! `meshgate` — a gateway daemon exposing an in-process pub/sub + RPC
//! messaging library over HTTP and WebSocket. See `SPEC_FULL.md`.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod mesh;
pub mod observability;
pub mod process;
pub mod rest;
pub mod ws;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::GatewayConfig;
use mesh::Mesh;
use observability::HealthStatus;
use process::ProcessState;
use ws::Route;

/// Everything a request handler needs: process-wide connection tracking,
/// the mesh stand-in, and the resolved configuration. Constructed once in
/// `main` and shared via `axum`'s `State` extractor — never a
/// `static`/`lazy_static`, so tests can spin up independent gateways.
pub struct AppState {
    pub config: GatewayConfig,
    pub process: Arc<ProcessState>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let mesh = Arc::new(Mesh::new(config.root.clone()));
        let process = ProcessState::new(mesh);
        Arc::new(Self { config, process, started_at: Instant::now() })
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/wsapi/sub", get(upgrade_sub))
        .route("/wsapi/read", get(upgrade_read))
        .route("/wsapi/log", get(upgrade_log))
        .route("/wsapi/prpc", get(upgrade_prpc))
        .route("/wsapi/discover", get(upgrade_discover))
        .route("/healthz", get(healthz))
        .merge(rest::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

macro_rules! upgrade_handler {
    ($name:ident, $route:expr) => {
        async fn $name(
            ws: WebSocketUpgrade,
            State(state): State<Arc<AppState>>,
        ) -> axum::response::Response {
            ws.on_upgrade(move |socket| ws::handle_socket(socket, state, $route))
        }
    };
}

upgrade_handler!(upgrade_sub, Route::Sub);
upgrade_handler!(upgrade_read, Route::Read);
upgrade_handler!(upgrade_log, Route::Log);
upgrade_handler!(upgrade_prpc, Route::Prpc);
upgrade_handler!(upgrade_discover, Route::Discover);

async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let uptime_secs = state.started_at.elapsed().as_secs();
    let active = state.process.active_count().await;
    Json(HealthStatus::ok(uptime_secs, active))
}
