//! Generation request as accepted by [`TaskRegistry::submit`](crate::TaskRegistry::submit).

use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::task::TaskMetadata;
use dreamcanvas_jimeng::GenerationParams;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "3.0";
pub const DEFAULT_SIZE: &str = "1024x1024";

const MIN_BATCH: i64 = 1;
const MAX_BATCH: i64 = 4;

/// Caller-supplied generation request.
///
/// Everything but `prompt` is optional. A missing prompt deserializes as
/// empty and is rejected by [`validate`](Self::validate).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub batch: Option<i64>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub reference_image: Option<String>,
}

impl SubmitRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Reject blank prompts.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt must not be empty".to_string()));
        }
        Ok(())
    }

    /// Effective batch size, clamped to 1..=4.
    pub fn batch(&self) -> u8 {
        // Clamped into 1..=4 above, so the cast cannot truncate.
        self.batch.unwrap_or(MIN_BATCH).clamp(MIN_BATCH, MAX_BATCH) as u8
    }

    pub fn model(&self) -> &str {
        non_blank(self.model.as_deref()).unwrap_or(DEFAULT_MODEL)
    }

    pub fn size(&self) -> &str {
        non_blank(self.size.as_deref()).unwrap_or(DEFAULT_SIZE)
    }

    /// Task metadata for this request, submitted under `account`.
    pub fn metadata(&self, account: &str) -> TaskMetadata {
        TaskMetadata {
            model: self.model().to_string(),
            size: self.size().to_string(),
            batch: self.batch(),
            account: account.to_string(),
            project_id: non_blank(self.project_id.as_deref()).map(str::to_string),
            reference_image: non_blank(self.reference_image.as_deref()).map(str::to_string),
            ..TaskMetadata::default()
        }
    }

    /// Parameters handed to the job client.
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            prompt: self.prompt.trim().to_string(),
            model: self.model().to_string(),
            size: self.size().to_string(),
            batch: self.batch(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn blank_prompt_is_rejected() {
        assert_matches!(SubmitRequest::new("   ").validate(), Err(CoreError::Validation(_)));
        assert!(SubmitRequest::new("a cat").validate().is_ok());
    }

    #[test]
    fn defaults_apply() {
        let req = SubmitRequest::new("a cat");
        let meta = req.metadata("mock");
        assert_eq!(meta.model, "3.0");
        assert_eq!(meta.size, "1024x1024");
        assert_eq!(meta.batch, 1);
        assert_eq!(meta.account, "mock");
        assert!(meta.project_id.is_none());
        assert!(meta.history_id.is_none());
    }

    #[test]
    fn batch_is_clamped() {
        let mut req = SubmitRequest::new("a cat");
        req.batch = Some(0);
        assert_eq!(req.batch(), 1);
        req.batch = Some(-3);
        assert_eq!(req.batch(), 1);
        req.batch = Some(12);
        assert_eq!(req.batch(), 4);
        req.batch = Some(3);
        assert_eq!(req.params().batch, 3);
    }

    #[test]
    fn deserializes_camel_case_with_missing_fields() {
        let req: SubmitRequest = serde_json::from_value(serde_json::json!({
            "prompt": "city",
            "projectId": "p1",
            "size": " ",
        }))
        .unwrap();
        assert_eq!(req.project_id.as_deref(), Some("p1"));
        assert_eq!(req.size(), DEFAULT_SIZE);

        let empty: SubmitRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.validate().is_err());
    }
}
