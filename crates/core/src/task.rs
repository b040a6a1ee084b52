//! Generation task records.
//!
//! A [`GenerationTask`] is the registry's view of one image-generation job.
//! It is serialized in camelCase for the desktop client.

use serde::{Deserialize, Serialize};

use crate::types::EpochMillis;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation task.
///
/// `queued` and `running` may alternate while the job is in flight;
/// `succeeded`, `failed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transition may leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Per-task metadata.
///
/// The fixed fields cover everything the registry and asset persistence
/// read. Provider-specific values go into [`extra`](Self::extra), which is
/// flattened into the same JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub model: String,
    pub size: String,
    pub batch: u8,
    /// Label of the external account the job was submitted with.
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    /// External history id. `None` when submission failed before the
    /// service assigned one and the task id was generated locally.
    #[serde(default)]
    pub history_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<EpochMillis>,
    /// Paths of result files downloaded into project storage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_uris: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One tracked image-generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTask {
    pub task_id: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub metadata: TaskMetadata,
    #[serde(default)]
    pub result_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}
