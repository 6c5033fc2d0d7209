//! Axum HTTP/WebSocket server exposing the telephony media channel:
//! process bootstrap lives in `main.rs`, this crate owns the router and the
//! WebSocket gateway protocol.

pub mod gateway;
pub mod http;
pub mod metrics;
pub mod state;

pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router: health check, Prometheus metrics, and the
/// telephony media WebSocket at `Settings::server::websocket_path`.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.server.cors_allowed_origins);
    let ws_path = state.settings.server.websocket_path.clone();

    Router::new()
        .route("/health", get(http::health_check))
        .route("/ready", get(http::readiness_check))
        .route("/metrics", get(http::metrics_handler))
        .route(&ws_path, get(gateway::handle_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
        .collect();
    if parsed.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
}
