//! Axum route handlers for the Flow API.

use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::flow::controller::FlowReport;
use crate::flow::request::{Request, TriggerPayload};
use crate::state::AppState;

/// POST /api/v1/flows
/// Body: trigger payload (`user_path` + `user_request`, legacy keys accepted).
/// 200 with the report on `done` / `cache_hit`, 422 with the report on rejection.
pub async fn handle_run_flow(
    State(state): State<AppState>,
    Json(payload): Json<TriggerPayload>,
) -> Result<Json<FlowReport>, AppError> {
    let request = Request::from_trigger(&payload, state.source_ref.clone())?;
    let report = state.controller.run(request).await?;

    if report.outcome.is_failed() {
        let details = serde_json::to_value(&report).map_err(|e| AppError::Internal(e.into()))?;
        return Err(AppError::Rejected(details));
    }
    Ok(Json(report))
}
