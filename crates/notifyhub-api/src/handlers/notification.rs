//! Notification handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use notifyhub_core::error::AppError;
use notifyhub_entity::notification::CreateNotificationRequest;
use notifyhub_realtime::DispatchOutcome;

use crate::dto::ApiResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/notifications
pub async fn create_notification(
    State(state): State<AppState>,
    payload: Result<Json<CreateNotificationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<DispatchOutcome>>), ApiError> {
    let Json(request) =
        payload.map_err(|e| AppError::validation(format!("Invalid request body: {}", e.body_text())))?;

    let outcome = state.engine.orchestrator.create_and_dispatch(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}
