use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use engine::{EngineError, ExecutionRequest, ExecutionStatus};

use super::AppState;

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedDto {
    pub execution_id: Uuid,
}

/// Kick off an execution. Returns 202 with the id right away; progress
/// is polled via the status endpoint.
pub async fn start(
    State(state): State<AppState>,
    Json(payload): Json<ExecutionRequest>,
) -> Result<(StatusCode, Json<StartedDto>), StatusCode> {
    match state.engine.start(payload).await {
        Ok(execution_id) => Ok((StatusCode::ACCEPTED, Json(StartedDto { execution_id }))),
        Err(EngineError::NoDevices | EngineError::EmptyQueue) => Err(StatusCode::BAD_REQUEST),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Ids of executions currently in flight.
pub async fn list(State(state): State<AppState>) -> Json<Vec<Uuid>> {
    Json(state.engine.registry().active_ids())
}

pub async fn status(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionStatus>, StatusCode> {
    state
        .engine
        .registry()
        .status(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Request a graceful stop. 404 once the execution has finished and
/// left the registry.
pub async fn stop(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    if state.engine.registry().request_stop(id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
