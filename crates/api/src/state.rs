use std::sync::Arc;

use dreamcanvas_core::storage::ProjectStorage;
use dreamcanvas_tasks::TaskRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the registry is a shared handle and everything else
/// is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Generation task registry.
    pub registry: TaskRegistry,
    /// File-backed project storage.
    pub projects: Arc<ProjectStorage>,
}
