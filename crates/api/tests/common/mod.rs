#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use dreamcanvas_core::storage::ProjectStorage;
use dreamcanvas_core::task::TaskStatus;
use dreamcanvas_jimeng::{GenerationParams, JimengError, JobClient, SubmissionResult};
use dreamcanvas_tasks::{AssetPersister, RegistryConfig, TaskRegistry};
use http_body_util::BodyExt;
use tower::ServiceExt;

use dreamcanvas_api::config::ServerConfig;
use dreamcanvas_api::router::build_app_router;
use dreamcanvas_api::state::AppState;

/// Time a `#stall` submission takes before the job is accepted.
pub const STALL: Duration = Duration::from_millis(1500);

/// Job client mirroring the desktop test fixtures: `#quota` prompts fail
/// with 1015 on the second poll, `#slow` prompts never finish, `#stall`
/// prompts take [`STALL`] to be accepted, everything else succeeds on the
/// second poll.
#[derive(Default)]
pub struct MockJobClient {
    jobs: Mutex<HashMap<String, (String, usize)>>,
    pub submits: AtomicUsize,
}

#[async_trait]
impl JobClient for MockJobClient {
    fn account_label(&self) -> &str {
        "mock"
    }

    async fn submit(&self, params: &GenerationParams) -> Result<SubmissionResult, JimengError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if params.prompt.contains("#stall") {
            tokio::time::sleep(STALL).await;
        }
        let history_id = uuid::Uuid::new_v4().simple().to_string();
        let scenario = if params.prompt.contains("#quota") {
            "quota"
        } else if params.prompt.contains("#slow") {
            "slow"
        } else {
            "success"
        };
        self.jobs
            .lock()
            .unwrap()
            .insert(history_id.clone(), (scenario.to_string(), 0));
        let status = if scenario == "quota" {
            TaskStatus::Queued
        } else {
            TaskStatus::Running
        };
        Ok(SubmissionResult::with_status(history_id, status))
    }

    async fn fetch_status(&self, history_id: &str) -> Result<SubmissionResult, JimengError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some((scenario, polls)) = jobs.get_mut(history_id) else {
            return Ok(SubmissionResult::failed(history_id, "unknown", "task does not exist"));
        };
        *polls += 1;
        Ok(match (scenario.as_str(), *polls) {
            ("quota", n) if n >= 2 => {
                SubmissionResult::failed(history_id, "1015", "account is rate limited")
            }
            ("success", n) if n >= 2 => {
                SubmissionResult::succeeded(history_id, vec![format!("https://mock/{history_id}.png")])
            }
            _ => SubmissionResult::with_status(history_id, TaskStatus::Running),
        })
    }

    async fn fetch_resource(&self, _url: &str) -> Result<Vec<u8>, JimengError> {
        Ok(b"mock-binary".to_vec())
    }
}

/// Build a test `ServerConfig` rooted in `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        projects_dir: dir.join("projects"),
        secrets_path: dir.join("secrets.local.json"),
        jimeng_base_url: "http://127.0.0.1:9".to_string(),
        poll_interval_ms: 20,
        poll_timeout_secs: 5,
        phase: "P0".to_string(),
        log_dir: dir.join("logs"),
        backups_dir: dir.join("backups"),
    }
}

pub struct TestApp {
    pub router: Router,
    pub client: Arc<MockJobClient>,
    pub config: ServerConfig,
    pub registry: TaskRegistry,
    pub projects: Arc<ProjectStorage>,
    _dir: tempfile::TempDir,
}

/// Build the full application router over a mock job client and a
/// temporary project store.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(|_| {}).await
}

/// Like [`build_test_app`], with a hook to adjust the configuration.
pub async fn build_test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let projects = Arc::new(ProjectStorage::open(&config.projects_dir).await.unwrap());
    let client = Arc::new(MockJobClient::default());
    let persister = AssetPersister::new(client.clone(), projects.clone());
    let registry = TaskRegistry::new(
        client.clone(),
        Some(persister),
        RegistryConfig {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        },
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        registry: registry.clone(),
        projects: projects.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        client,
        config,
        registry,
        projects,
        _dir: dir,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body)).await
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `GET /api/v1/jimeng/tasks/{id}` until the status is terminal.
pub async fn wait_for_terminal(app: &Router, task_id: &str) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let json = body_json(get(app, &format!("/api/v1/jimeng/tasks/{task_id}")).await).await;
        let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
        if matches!(status.as_str(), "succeeded" | "failed" | "cancelled") {
            return json["data"].clone();
        }
        assert!(tokio::time::Instant::now() < deadline, "task {task_id} never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
