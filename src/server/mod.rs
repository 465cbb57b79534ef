//! HTTP query API for the runtime state.
//!
//! Uses `axum` for routing with CORS support. All endpoints are read-only;
//! `GET /state` may bootstrap the state on first access.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{AppConfig, RiskConfig, SignalConfig, TradingConfig};
use crate::core::service::StateService;
use crate::core::state::RuntimeState;
use crate::core::store::StoreError;
use crate::error::AppError;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StateService>,
    pub config: Arc<AppConfig>,
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/config", get(config_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// Runs until a message arrives on `shutdown_rx`.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AppError> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Starting HTTP API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| AppError::Server(e.to_string()))?;

    info!("HTTP API server stopped");
    Ok(())
}

/// GET /health: liveness probe
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// GET /state: current runtime state, bootstrapped on first access
async fn state_handler(State(state): State<AppState>) -> Result<Json<RuntimeState>, ApiError> {
    let defaults = state.config.bootstrap_defaults();
    let runtime = state.service.get_or_init(&defaults).await?;
    Ok(Json(runtime))
}

/// Public trading parameters (no filesystem paths or bind addresses)
#[derive(Debug, Serialize)]
struct PublicConfig {
    trading: TradingConfig,
    risk: RiskConfig,
    signal: SignalConfig,
}

/// GET /config: trading, risk and signal parameters
async fn config_handler(State(state): State<AppState>) -> Json<PublicConfig> {
    Json(PublicConfig {
        trading: state.config.trading.clone(),
        risk: state.config.risk.clone(),
        signal: state.config.signal.clone(),
    })
}

/// Store failure surfaced as `500 {"error": ...}`
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "State request failed");
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

// ============================================================================
// Tests
// ============================================================================
