use axum::routing::{get, post};
use axum::Router;

use crate::handlers::system;
use crate::state::AppState;

/// Routes mounted at `/system`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/diagnostics", get(system::diagnostics))
        .route("/backup", post(system::backup))
}
