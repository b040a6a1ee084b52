//! Background polling of one in-flight job.

use std::sync::Arc;

use dreamcanvas_jimeng::SubmissionResult;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::registry::{PollStep, RegistryInner};

/// Error code of polls that failed without a client code.
pub const POLL_FAILED_CODE: &str = "poll_failed";

/// Poll `history_id` until the task is terminal, times out, loses its poll
/// context, or `cancel` fires.
pub(crate) async fn poll_task(
    inner: Arc<RegistryInner>,
    task_id: String,
    history_id: String,
    started: Instant,
    cancel: CancellationToken,
) {
    tracing::debug!(task_id = %task_id, "Poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.poll_interval) => {}
        }

        if !inner.is_polling(&task_id).await {
            break;
        }
        if started.elapsed() > inner.config.poll_timeout {
            inner.expire(&task_id).await;
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = inner.client.fetch_status(&history_id) => result,
        };
        let result = result.unwrap_or_else(|e| {
            tracing::warn!(task_id = %task_id, error = %e, "Status poll failed");
            let code = e.code().unwrap_or_else(|| POLL_FAILED_CODE.to_string());
            SubmissionResult::failed(history_id.as_str(), code, e.message())
        });

        if inner.apply_result(&task_id, result).await == PollStep::Stop {
            break;
        }
    }

    tracing::debug!(task_id = %task_id, "Poller exited");
}
