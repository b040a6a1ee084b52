use axum::extract::State;
use axum::Json;
use dreamcanvas_core::task::TaskStatus;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/system/diagnostics
pub async fn diagnostics(State(state): State<AppState>) -> AppResult<Json<DataResponse<Value>>> {
    let projects = state.projects.diagnostics().await?;
    let tasks = state.registry.list_tasks().await;
    let active = tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Running))
        .count();

    Ok(Json(DataResponse {
        data: json!({
            "version": env!("CARGO_PKG_VERSION"),
            "phase": state.config.phase,
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            "logDir": state.config.log_dir.display().to_string(),
            "projectsDir": state.projects.root().display().to_string(),
            "projects": projects,
            "tasks": {
                "total": tasks.len(),
                "active": active,
                "polling": state.registry.active_polls().await,
            },
        }),
    }))
}

/// POST /api/v1/system/backup
///
/// Zips the project storage root into the configured backups directory.
pub async fn backup(State(state): State<AppState>) -> AppResult<Json<DataResponse<Value>>> {
    let archive = state.projects.backup(&state.config.backups_dir).await?;
    Ok(Json(DataResponse {
        data: json!({
            "status": "succeeded",
            "path": archive.display().to_string(),
        }),
    }))
}
