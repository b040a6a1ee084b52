pub mod health;
pub mod jimeng;
pub mod projects;
pub mod system;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jimeng/tasks                     submit (POST), list (GET)
/// /jimeng/tasks/{id}                get
/// /jimeng/tasks/{id}/cancel         cancel (POST)
/// /jimeng/tasks/{id}/trace          trace events
/// /jimeng/history?taskId=           get (query form)
///
/// /projects                         list, create
/// /projects/{id}                    load, save
///
/// /system/diagnostics               storage and task overview
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jimeng", jimeng::router())
        .nest("/projects", projects::router())
        .nest("/system", system::router())
}
