//! Metrics handlers.

use axum::Json;
use axum::extract::{Path, State};

use notifyhub_core::error::AppError;
use notifyhub_core::types::NotificationId;
use notifyhub_realtime::metrics::DeliveryMetrics;
use notifyhub_realtime::server::EngineSnapshot;

use crate::dto::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/metrics
pub async fn engine_metrics(State(state): State<AppState>) -> Json<ApiResponse<EngineSnapshot>> {
    Json(ApiResponse::ok(state.engine.snapshot()))
}

/// GET /api/metrics/notifications/{id}
pub async fn notification_metrics(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
) -> Result<Json<ApiResponse<DeliveryMetrics>>, ApiError> {
    let metrics = state
        .engine
        .metrics
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("No delivery metrics for {id}")))?;
    Ok(Json(ApiResponse::ok(metrics)))
}
