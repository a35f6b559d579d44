//! Health check handler.

use axum::Json;
use axum::extract::State;

use crate::dto::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let status = if state.engine.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(ApiResponse::ok(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.engine.registry.total_connections(),
        users: state.engine.registry.user_count(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}
