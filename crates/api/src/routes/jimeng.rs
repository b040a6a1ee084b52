//! Route definitions for the `/jimeng` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jimeng;
use crate::state::AppState;

/// Routes mounted at `/jimeng`.
///
/// ```text
/// POST   /tasks                -> submit
/// GET    /tasks                -> list
/// GET    /tasks/{id}           -> get_by_id
/// POST   /tasks/{id}/cancel    -> cancel
/// GET    /tasks/{id}/trace     -> trace
/// GET    /history?taskId=      -> history
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(jimeng::list).post(jimeng::submit))
        .route("/tasks/{id}", get(jimeng::get_by_id))
        .route("/tasks/{id}/cancel", post(jimeng::cancel))
        .route("/tasks/{id}/trace", get(jimeng::trace))
        .route("/history", get(jimeng::history))
}
