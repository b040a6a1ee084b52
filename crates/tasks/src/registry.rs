//! In-memory registry of generation tasks.
//!
//! [`TaskRegistry`] owns every task record, the poll context of each
//! in-flight job, the per-task trace and the set of tasks whose assets are
//! being persisted. All of that lives in one [`RegistryState`] behind one
//! mutex; nothing is mutated outside of it.
//!
//! Background work (pollers and persist workers) is spawned on a
//! [`TaskTracker`] and observes a master [`CancellationToken`], so
//! [`TaskRegistry::shutdown`] can stop and join all of it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::task::{GenerationTask, TaskMetadata, TaskStatus};
use dreamcanvas_core::types::{now_millis, EpochMillis};
use dreamcanvas_jimeng::{JobClient, SubmissionResult};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::RegistryConfig;
use crate::persist::{AssetPersister, PersistOutcome};
use crate::poller::poll_task;
use crate::request::SubmitRequest;
use crate::trace::{TraceEvent, TraceKind};

/// Error code of tasks whose submission failed without a client code.
pub const SUBMIT_FAILED_CODE: &str = "submit_failed";

/// Error code of tasks that exceeded the poll timeout.
pub const TIMEOUT_CODE: &str = "timeout";

/// Prefix of task ids generated locally when submission fails.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Shared handle to the task registry. Cheap to clone.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    pub(crate) client: Arc<dyn JobClient>,
    persister: Option<Arc<AssetPersister>>,
    pub(crate) config: RegistryConfig,
    state: Mutex<RegistryState>,
    /// Master cancellation token; every poller holds a child of it.
    cancel: CancellationToken,
    tracker: TaskTracker,
}

#[derive(Default)]
struct RegistryState {
    tasks: IndexMap<String, GenerationTask>,
    contexts: HashMap<String, PollContext>,
    traces: HashMap<String, Vec<TraceEvent>>,
    /// Tasks with a persist worker in flight.
    persisting: HashSet<String>,
}

impl RegistryState {
    fn record(&mut self, task_id: &str, event: TraceEvent) {
        self.traces.entry(task_id.to_string()).or_default().push(event);
    }
}

/// Bookkeeping for one in-flight job.
struct PollContext {
    history_id: String,
    created_at: EpochMillis,
    started: Instant,
    /// Metadata as of submission.
    metadata: TaskMetadata,
    /// Child of the registry's master token.
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Result of [`TaskRegistry::cancel_task`].
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    /// The task after the call. Unchanged if it had already finished.
    pub task: GenerationTask,
    /// Whether this call moved the task to `cancelled`.
    pub cancelled: bool,
}

/// What the poller should do after a result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollStep {
    Continue,
    Stop,
}

impl TaskRegistry {
    /// Create a registry. Without a persister, successful results are not
    /// written to project storage.
    pub fn new(
        client: Arc<dyn JobClient>,
        persister: Option<AssetPersister>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                client,
                persister: persister.map(Arc::new),
                config,
                state: Mutex::new(RegistryState::default()),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Submit a generation request.
    ///
    /// A blank prompt fails with [`CoreError::Validation`]. A submission the
    /// client rejects is not an error: it produces a `failed` task with a
    /// locally generated id and no history id.
    ///
    /// The client call and the registration of its result run on the
    /// registry's tracker, so a caller that stops waiting (a request
    /// timeout, a dropped connection) never leaves an accepted upstream job
    /// untracked.
    pub async fn submit(&self, request: SubmitRequest) -> Result<GenerationTask, CoreError> {
        request.validate()?;
        let inner = Arc::clone(&self.inner);
        self.inner
            .tracker
            .spawn(async move { inner.submit_and_register(request).await })
            .await
            .map_err(|e| CoreError::Internal(format!("Submission worker failed: {e}")))
    }

    /// Look up a task by id.
    pub async fn get_task(&self, task_id: &str) -> Result<GenerationTask, CoreError> {
        self.inner
            .state
            .lock()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Task", task_id))
    }

    /// Snapshot of all tasks in submission order.
    pub async fn list_tasks(&self) -> Vec<GenerationTask> {
        self.inner.state.lock().await.tasks.values().cloned().collect()
    }

    /// Cancel a task.
    ///
    /// A task that already finished, including one cancelled earlier, is
    /// returned unchanged with `cancelled == false`. Otherwise the poller is
    /// stopped and awaited before returning.
    pub async fn cancel_task(&self, task_id: &str) -> Result<CancelOutcome, CoreError> {
        let (task, context) = {
            let mut state = self.inner.state.lock().await;
            let task = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| CoreError::not_found("Task", task_id))?;
            if task.status.is_terminal() {
                return Ok(CancelOutcome {
                    task: task.clone(),
                    cancelled: false,
                });
            }

            let now = now_millis();
            task.status = TaskStatus::Cancelled;
            task.metadata.cancelled_at = Some(now);
            task.updated_at = now;
            let task = task.clone();

            state.record(task_id, TraceEvent::new(TraceKind::Cancelled, TaskStatus::Cancelled));
            (task, state.contexts.remove(task_id))
        };

        if let Some(mut context) = context {
            context.cancel.cancel();
            if let Some(handle) = context.handle.take() {
                if let Err(e) = handle.await {
                    tracing::error!(task_id, error = %e, "Poller ended abnormally");
                }
            }
        }

        tracing::info!(task_id, "Task cancelled");
        Ok(CancelOutcome {
            task,
            cancelled: true,
        })
    }

    /// Trace events of a task, oldest first.
    pub async fn trace(&self, task_id: &str) -> Result<Vec<TraceEvent>, CoreError> {
        let state = self.inner.state.lock().await;
        if !state.tasks.contains_key(task_id) {
            return Err(CoreError::not_found("Task", task_id));
        }
        Ok(state.traces.get(task_id).cloned().unwrap_or_default())
    }

    /// Number of jobs currently being polled.
    pub async fn active_polls(&self) -> usize {
        self.inner.state.lock().await.contexts.len()
    }

    /// Stop all pollers and wait for them and any persist workers to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down task registry");
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::info!("Task registry shut down complete");
    }
}

impl RegistryInner {
    /// Submit through the client and record the outcome.
    async fn submit_and_register(self: &Arc<Self>, request: SubmitRequest) -> GenerationTask {
        let mut metadata = request.metadata(self.client.account_label());
        let prompt = request.prompt.trim().to_string();
        let now = now_millis();

        let result = match self.client.submit(&request.params()).await {
            Ok(result) => result,
            Err(e) => {
                let task_id = format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4());
                let code = e.code().unwrap_or_else(|| SUBMIT_FAILED_CODE.to_string());
                tracing::warn!(task_id = %task_id, code = %code, error = %e, "Submission failed");

                let task = GenerationTask {
                    task_id: task_id.clone(),
                    prompt,
                    status: TaskStatus::Failed,
                    metadata,
                    result_uris: Vec::new(),
                    error_code: Some(code.clone()),
                    error_message: Some(e.message()),
                    created_at: now,
                    updated_at: now,
                };

                let mut state = self.state.lock().await;
                state.record(&task_id, TraceEvent::new(TraceKind::Submit, TaskStatus::Failed));
                state.record(
                    &task_id,
                    TraceEvent::new(TraceKind::Failed, TaskStatus::Failed).with_detail(code),
                );
                state.tasks.insert(task_id, task.clone());
                return task;
            }
        };

        let task_id = result.history_id.clone();
        metadata.history_id = Some(task_id.clone());
        let mut task = GenerationTask {
            task_id: task_id.clone(),
            prompt,
            status: result.status,
            metadata,
            result_uris: Vec::new(),
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        apply_to_task(&mut task, &result);

        tracing::info!(task_id = %task_id, status = %task.status, "Task submitted");

        let mut state = self.state.lock().await;
        state.record(
            &task_id,
            TraceEvent::new(TraceKind::Submit, task.status).with_detail(task_id.clone()),
        );
        state.tasks.insert(task_id.clone(), task.clone());

        if task.status.is_terminal() {
            record_terminal(&mut state, &task);
            self.schedule_persist(&mut state, &task);
        } else {
            let cancel = self.cancel.child_token();
            let started = Instant::now();
            let handle = self.tracker.spawn(poll_task(
                Arc::clone(self),
                task_id.clone(),
                task_id.clone(),
                started,
                cancel.clone(),
            ));
            state.contexts.insert(
                task_id.clone(),
                PollContext {
                    history_id: task_id,
                    created_at: now,
                    started,
                    metadata: task.metadata.clone(),
                    cancel,
                    handle: Some(handle),
                },
            );
        }

        task
    }

    /// Whether the task still has a poll context.
    pub(crate) async fn is_polling(&self, task_id: &str) -> bool {
        self.state.lock().await.contexts.contains_key(task_id)
    }

    /// Fail a task that exceeded the poll timeout.
    pub(crate) async fn expire(&self, task_id: &str) {
        let mut state = self.state.lock().await;
        let Some(context) = state.contexts.remove(task_id) else {
            return;
        };
        let Some(task) = state.tasks.get_mut(task_id) else {
            return;
        };

        let timeout_secs = self.config.poll_timeout.as_secs_f64();
        task.status = TaskStatus::Failed;
        task.error_code = Some(TIMEOUT_CODE.to_string());
        task.error_message = Some(format!("Task timed out after {timeout_secs:.0}s"));
        task.updated_at = now_millis();

        tracing::warn!(
            task_id,
            history_id = %context.history_id,
            age_ms = now_millis() - context.created_at,
            polled_for_ms = context.started.elapsed().as_millis() as u64,
            "Task timed out",
        );
        state.record(
            task_id,
            TraceEvent::new(TraceKind::Timeout, TaskStatus::Failed).with_detail(TIMEOUT_CODE),
        );
    }

    /// Apply a polled result, as long as the task is still being polled.
    pub(crate) async fn apply_result(
        self: &Arc<Self>,
        task_id: &str,
        result: SubmissionResult,
    ) -> PollStep {
        let mut state = self.state.lock().await;
        if !state.contexts.contains_key(task_id) {
            return PollStep::Stop;
        }
        let Some(task) = state.tasks.get_mut(task_id) else {
            return PollStep::Stop;
        };

        apply_to_task(task, &result);
        let task = task.clone();
        state.record(task_id, TraceEvent::new(TraceKind::Poll, task.status));

        if !task.status.is_terminal() {
            return PollStep::Continue;
        }

        if let Some(context) = state.contexts.remove(task_id) {
            tracing::info!(
                task_id,
                status = %task.status,
                model = %context.metadata.model,
                "Task finished",
            );
        }
        record_terminal(&mut state, &task);
        self.schedule_persist(&mut state, &task);
        PollStep::Stop
    }

    /// Spawn a persist worker for a succeeded task, unless one is already
    /// running or there is nothing to persist.
    fn schedule_persist(self: &Arc<Self>, state: &mut RegistryState, task: &GenerationTask) {
        let Some(persister) = self.persister.clone() else {
            return;
        };
        let Some(project_id) = task.metadata.project_id.clone() else {
            return;
        };
        if task.status != TaskStatus::Succeeded || task.result_uris.is_empty() {
            return;
        }
        if !state.persisting.insert(task.task_id.clone()) {
            return;
        }

        let inner = Arc::clone(self);
        let task = task.clone();
        self.tracker.spawn(async move {
            let outcome = persister.persist(&task, &project_id).await;
            inner.finish_persist(&task.task_id, outcome).await;
        });
    }

    async fn finish_persist(
        &self,
        task_id: &str,
        outcome: Result<PersistOutcome, CoreError>,
    ) {
        let mut state = self.state.lock().await;
        state.persisting.remove(task_id);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(task_id, error = %e, "Asset persistence failed");
                return;
            }
        };

        let status = match state.tasks.get_mut(task_id) {
            Some(task) => {
                if !outcome.local_paths.is_empty() {
                    task.metadata.local_uris = outcome.local_paths.clone();
                    task.updated_at = now_millis();
                }
                task.status
            }
            None => return,
        };
        state.record(
            task_id,
            TraceEvent::new(TraceKind::AssetsPersisted, status)
                .with_detail(format!("{} assets", outcome.assets.len())),
        );
    }
}

// ---- private helpers ----

/// Copy the fields of a client result onto a task.
fn apply_to_task(task: &mut GenerationTask, result: &SubmissionResult) {
    task.status = result.status;
    if !result.result_urls.is_empty() {
        task.result_uris = result.result_urls.clone();
    }
    if result.error_code.is_some() {
        task.error_code = result.error_code.clone();
    }
    if result.error_message.is_some() {
        task.error_message = result.error_message.clone();
    }
    task.metadata.queue_message = result.queue_message.clone();
    task.metadata.queue_info = result.queue_info.clone();
    task.updated_at = now_millis();
}

/// Trace the terminal outcome of a task.
fn record_terminal(state: &mut RegistryState, task: &GenerationTask) {
    let event = match task.status {
        TaskStatus::Succeeded => TraceEvent::new(TraceKind::Completed, task.status)
            .with_detail(format!("{} results", task.result_uris.len())),
        TaskStatus::Failed => {
            let event = TraceEvent::new(TraceKind::Failed, task.status);
            match &task.error_code {
                Some(code) => event.with_detail(code.clone()),
                None => event,
            }
        }
        _ => return,
    };
    state.record(&task.task_id, event);
}
