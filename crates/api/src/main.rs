use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use dreamcanvas_core::storage::ProjectStorage;
use dreamcanvas_jimeng::JimengApi;
use dreamcanvas_tasks::{AssetPersister, TaskRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dreamcanvas_api::config::ServerConfig;
use dreamcanvas_api::router::build_app_router;
use dreamcanvas_api::secrets::Secrets;
use dreamcanvas_api::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dreamcanvas_api=debug,dreamcanvas_tasks=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Project storage ---
    let projects = Arc::new(ProjectStorage::open(&config.projects_dir).await?);
    tracing::info!(root = %config.projects_dir.display(), "Project storage opened");

    // --- Jimeng client ---
    let secrets = Secrets::load(&config.secrets_path).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not load secrets");
        Secrets::default()
    });
    let client = Arc::new(JimengApi::new(
        &secrets.jimeng_config(&config.jimeng_base_url),
    )?);

    // --- Task registry ---
    let persister = AssetPersister::new(client.clone(), projects.clone());
    let registry = TaskRegistry::new(client, Some(persister), config.registry_config());
    tracing::info!(
        poll_interval_ms = config.poll_interval_ms,
        poll_timeout_secs = config.poll_timeout_secs,
        "Task registry started",
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        registry: registry.clone(),
        projects,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    registry.shutdown().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
