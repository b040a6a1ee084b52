//! Handlers for the `/projects` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::project::{ProjectPayload, ProjectSummary};
use dreamcanvas_core::storage::ProjectStore;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    #[serde(default)]
    pub name: String,
}

/// POST /api/v1/projects
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateProject>,
) -> AppResult<(StatusCode, Json<DataResponse<ProjectPayload>>)> {
    let project = state.projects.create_project(&input.name).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: project })))
}

/// GET /api/v1/projects
pub async fn list(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ProjectSummary>>>> {
    let projects = state.projects.list_projects().await?;
    Ok(Json(DataResponse { data: projects }))
}

/// GET /api/v1/projects/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<ProjectPayload>>> {
    let project = state.projects.load_project(&id).await?;
    Ok(Json(DataResponse { data: project }))
}

/// PUT /api/v1/projects/{id}
///
/// The payload's manifest id must match the path. The project must exist.
pub async fn save(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ProjectPayload>,
) -> AppResult<Json<DataResponse<ProjectPayload>>> {
    if input.manifest.id != id {
        return Err(CoreError::Validation(format!(
            "Manifest id '{}' does not match project '{id}'",
            input.manifest.id
        ))
        .into());
    }
    state.projects.load_project(&id).await?;

    let saved = state.projects.save_project(input).await?;
    Ok(Json(DataResponse { data: saved }))
}
