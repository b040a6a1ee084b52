//! The job-client port consumed by the task registry.

use async_trait::async_trait;
use dreamcanvas_core::task::TaskStatus;
use serde::Serialize;

use crate::error::JimengError;

/// Inputs of one generation submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
    pub prompt: String,
    pub model: String,
    /// `"WxH"` style size string.
    pub size: String,
    /// Images per job, 1..=4.
    pub batch: u8,
}

/// Normalized result of a submission or a status poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub history_id: String,
    pub status: TaskStatus,
    pub result_urls: Vec<String>,
    pub queue_message: Option<String>,
    pub queue_info: Option<serde_json::Value>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Raw provider record, kept for diagnostics.
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

impl SubmissionResult {
    /// A bare result with no URLs, queue info or errors.
    pub fn with_status(history_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            history_id: history_id.into(),
            status,
            result_urls: Vec::new(),
            queue_message: None,
            queue_info: None,
            error_code: None,
            error_message: None,
            raw: None,
        }
    }

    /// A terminal failure carrying an error code and message.
    pub fn failed(
        history_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::with_status(history_id, TaskStatus::Failed)
        }
    }

    /// A success with the given result URLs.
    pub fn succeeded(history_id: impl Into<String>, result_urls: Vec<String>) -> Self {
        Self {
            result_urls,
            ..Self::with_status(history_id, TaskStatus::Succeeded)
        }
    }
}

/// Submit/poll/download capability of an image-generation service.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Label of the account jobs are submitted with.
    fn account_label(&self) -> &str;

    /// Submit a generation job and return its first known state.
    async fn submit(&self, params: &GenerationParams) -> Result<SubmissionResult, JimengError>;

    /// Fetch the current state of a submitted job.
    async fn fetch_status(&self, history_id: &str) -> Result<SubmissionResult, JimengError>;

    /// Download a result resource.
    async fn fetch_resource(&self, url: &str) -> Result<Vec<u8>, JimengError>;
}
