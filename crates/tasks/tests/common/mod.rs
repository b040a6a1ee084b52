//! Shared fixtures for registry integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dreamcanvas_core::storage::ProjectStorage;
use dreamcanvas_core::task::{GenerationTask, TaskStatus};
use dreamcanvas_jimeng::{GenerationParams, JimengError, JobClient, SubmissionResult};
use dreamcanvas_tasks::{AssetPersister, RegistryConfig, TaskRegistry};

/// How a mocked job behaves, chosen from markers in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Running on the first poll, succeeded with one image on the second.
    Success,
    /// Queued, then rejected with code 1015 on the second poll.
    Quota,
    /// Never finishes.
    Slow,
    /// Succeeds immediately at submission with two images.
    Instant,
    /// Status queries fail with a client error carrying code 1015.
    PollRejected,
    /// Status queries fail with a client error that has no code.
    PollBroken,
}

impl Scenario {
    fn from_prompt(prompt: &str) -> Self {
        let prompt = prompt.to_lowercase();
        if prompt.contains("#quota") {
            Self::Quota
        } else if prompt.contains("#slow") {
            Self::Slow
        } else if prompt.contains("#instant") {
            Self::Instant
        } else if prompt.contains("#pollreject") {
            Self::PollRejected
        } else if prompt.contains("#pollbroken") {
            Self::PollBroken
        } else {
            Self::Success
        }
    }
}

struct JobState {
    scenario: Scenario,
    polls: usize,
}

/// Time a `#stall` submission takes before the job is accepted.
pub const STALL: Duration = Duration::from_millis(300);

/// In-memory job client driven by prompt markers.
///
/// Prompts containing `#reject` fail at submission with code 1015 and
/// `#offline` fail at submission without a code. Prompts containing
/// `#stall` take [`STALL`] to be accepted. Downloads of URLs containing
/// `broken` fail.
#[derive(Default)]
pub struct MockJobClient {
    jobs: Mutex<HashMap<String, JobState>>,
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl MockJobClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl JobClient for MockJobClient {
    fn account_label(&self) -> &str {
        "mock"
    }

    async fn submit(&self, params: &GenerationParams) -> Result<SubmissionResult, JimengError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if params.prompt.contains("#reject") {
            return Err(JimengError::Rejected {
                code: "1015".into(),
                message: "account is rate limited".into(),
                payload: serde_json::json!({"ret": "1015"}),
            });
        }
        if params.prompt.contains("#offline") {
            return Err(JimengError::Malformed {
                message: "connection reset".into(),
                payload: None,
            });
        }

        if params.prompt.contains("#stall") {
            tokio::time::sleep(STALL).await;
        }

        let history_id = uuid::Uuid::new_v4().simple().to_string();
        let scenario = Scenario::from_prompt(&params.prompt);
        self.jobs.lock().unwrap().insert(
            history_id.clone(),
            JobState {
                scenario,
                polls: 0,
            },
        );

        Ok(match scenario {
            Scenario::Quota => SubmissionResult {
                queue_message: Some("Task queued, estimated wait: a few seconds".into()),
                ..SubmissionResult::with_status(history_id, TaskStatus::Queued)
            },
            Scenario::Instant => SubmissionResult::succeeded(
                history_id.clone(),
                vec![
                    format!("https://mock/{history_id}-a.png"),
                    format!("https://mock/{history_id}-b.webp"),
                ],
            ),
            Scenario::Success | Scenario::Slow | Scenario::PollRejected | Scenario::PollBroken => {
                SubmissionResult::with_status(history_id, TaskStatus::Running)
            }
        })
    }

    async fn fetch_status(&self, history_id: &str) -> Result<SubmissionResult, JimengError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(history_id) else {
            return Ok(SubmissionResult::failed(history_id, "unknown", "task does not exist"));
        };
        job.polls += 1;

        match job.scenario {
            Scenario::PollRejected => {
                return Err(JimengError::Rejected {
                    code: "1015".into(),
                    message: "account is rate limited".into(),
                    payload: serde_json::json!({"ret": "1015"}),
                })
            }
            Scenario::PollBroken => {
                return Err(JimengError::Malformed {
                    message: "history response is not JSON".into(),
                    payload: None,
                })
            }
            _ => {}
        }

        Ok(match (job.scenario, job.polls) {
            (Scenario::Quota, n) if n >= 2 => {
                SubmissionResult::failed(history_id, "1015", "account is rate limited")
            }
            (Scenario::Quota, _) => SubmissionResult {
                queue_message: Some("Waiting in queue".into()),
                ..SubmissionResult::with_status(history_id, TaskStatus::Running)
            },
            (Scenario::Success, n) if n >= 2 => {
                SubmissionResult::succeeded(history_id, vec![format!("https://mock/{history_id}.png")])
            }
            _ => SubmissionResult::with_status(history_id, TaskStatus::Running),
        })
    }

    async fn fetch_resource(&self, url: &str) -> Result<Vec<u8>, JimengError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(JimengError::Http {
                status: 404,
                body: "not found".into(),
            });
        }
        Ok(b"mock-binary".to_vec())
    }
}

/// Fast polling for tests.
pub fn fast_config() -> RegistryConfig {
    RegistryConfig {
        poll_interval: Duration::from_millis(20),
        poll_timeout: Duration::from_secs(5),
    }
}

pub struct Harness {
    pub registry: TaskRegistry,
    pub client: Arc<MockJobClient>,
    pub storage: Arc<ProjectStorage>,
    pub _dir: tempfile::TempDir,
}

pub async fn harness(config: RegistryConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(ProjectStorage::open(dir.path().join("projects")).await.unwrap());
    let client = MockJobClient::new();
    let persister = AssetPersister::new(client.clone(), storage.clone());
    let registry = TaskRegistry::new(client.clone(), Some(persister), config);
    Harness {
        registry,
        client,
        storage,
        _dir: dir,
    }
}

/// Poll the registry until `predicate` holds for the task, or panic after
/// a few seconds.
pub async fn wait_for<F>(registry: &TaskRegistry, task_id: &str, predicate: F) -> GenerationTask
where
    F: Fn(&GenerationTask) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = registry.get_task(task_id).await.unwrap();
        if predicate(&task) {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} never reached the expected state: {task:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_for_terminal(registry: &TaskRegistry, task_id: &str) -> GenerationTask {
    wait_for(registry, task_id, |t| t.status.is_terminal()).await
}
