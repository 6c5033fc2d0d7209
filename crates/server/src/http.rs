//! Plain HTTP handlers: liveness, readiness, and the Prometheus scrape
//! endpoint.

use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Readiness is process liveness plus "the session manager exists and can
/// accept calls" — there's no external dependency ping here since STT/TTS/LLM
/// connections are established per-call, not held open at rest.
pub async fn readiness_check(State(_state): State<AppState>) -> StatusCode {
    StatusCode::OK
}

pub async fn metrics_handler() -> String {
    crate::metrics::render()
}
