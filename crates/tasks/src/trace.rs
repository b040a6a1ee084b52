//! Per-task diagnostic event log.

use dreamcanvas_core::task::TaskStatus;
use dreamcanvas_core::types::{now_millis, EpochMillis};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Submit,
    Poll,
    Timeout,
    Completed,
    Failed,
    Cancelled,
    AssetsPersisted,
}

/// One entry of a task trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub kind: TraceKind,
    pub at: EpochMillis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TraceEvent {
    pub fn new(kind: TraceKind, status: TaskStatus) -> Self {
        Self {
            kind,
            at: now_millis(),
            status: Some(status),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case_kind() {
        let event = TraceEvent::new(TraceKind::AssetsPersisted, TaskStatus::Succeeded)
            .with_detail("2 assets");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "assets_persisted");
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["detail"], "2 assets");
    }
}
