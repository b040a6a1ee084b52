//! Handlers for the `/jimeng` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::task::GenerationTask;
use dreamcanvas_tasks::{SubmitRequest, TraceEvent};
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub task_id: String,
}

/// POST /api/v1/jimeng/tasks
pub async fn submit(
    State(state): State<AppState>,
    Json(input): Json<SubmitRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<GenerationTask>>)> {
    let task = state.registry.submit(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// GET /api/v1/jimeng/tasks
pub async fn list(State(state): State<AppState>) -> Json<DataResponse<Vec<GenerationTask>>> {
    Json(DataResponse {
        data: state.registry.list_tasks().await,
    })
}

/// GET /api/v1/jimeng/tasks/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<GenerationTask>>> {
    let task = state.registry.get_task(&id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// GET /api/v1/jimeng/history?taskId=
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<DataResponse<GenerationTask>>> {
    let task = state.registry.get_task(&query.task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/jimeng/tasks/{id}/cancel
///
/// Responds 409 when the task had already finished, including when it was
/// cancelled by an earlier call.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<GenerationTask>>> {
    let outcome = state.registry.cancel_task(&id).await?;
    if !outcome.cancelled {
        return Err(CoreError::Conflict(format!(
            "Task {id} already finished with status {}, cannot cancel",
            outcome.task.status
        ))
        .into());
    }
    Ok(Json(DataResponse { data: outcome.task }))
}

/// GET /api/v1/jimeng/tasks/{id}/trace
pub async fn trace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<TraceEvent>>>> {
    let events = state.registry.trace(&id).await?;
    Ok(Json(DataResponse { data: events }))
}
