use axum::{extract::State, http::StatusCode, Json};
use std::sync::atomic::Ordering;
use uuid::Uuid;

use crate::api::requests::CreateOperationRequest;
use crate::api::responses::{ApiResponse, ErrorResponse, OperationResponse};
use crate::idempotency::MetricsSnapshot;

use super::routes::AppState;

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Counters of the idempotency provider backing this router.
pub async fn idempotency_stats(State(state): State<AppState>) -> Json<ApiResponse<MetricsSnapshot>> {
    Json(ApiResponse::success(state.provider.metrics().snapshot()))
}

/// Accepts a side-effecting operation.
///
/// Each execution gets a fresh id and sequence number, so a replayed
/// response is recognisable by carrying the original ones.
pub async fn create_operation(
    State(state): State<AppState>,
    Json(request): Json<CreateOperationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OperationResponse>>), (StatusCode, Json<ApiResponse<()>>)> {
    if let Err(details) = request.validate() {
        let error = ErrorResponse::new("VALIDATION_ERROR", "Invalid operation request").with_details(details);
        return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(ApiResponse::<()>::error(error))));
    }

    let execution = state.executions.fetch_add(1, Ordering::SeqCst) + 1;
    let response = OperationResponse {
        operation_id: Uuid::new_v4(),
        name: request.name,
        execution,
        accepted_at: chrono::Utc::now(),
    };

    tracing::info!(
        operation_id = %response.operation_id,
        name = %response.name,
        execution,
        "Operation accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))))
}
