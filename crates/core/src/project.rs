//! Project data model.
//!
//! A project is stored as four JSON documents (manifest, canvas, assets,
//! history) that are always loaded and saved together as a
//! [`ProjectPayload`].

use serde::{Deserialize, Serialize};

use crate::types::EpochMillis;

/// Current on-disk project format version.
pub const PROJECT_VERSION: &str = "1.0.0";

/// Asset kind for generated images.
pub const ASSET_KIND_IMAGE: &str = "image";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub id: String,
    pub name: String,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub canvas_checksum: String,
}

fn default_version() -> String {
    PROJECT_VERSION.to_string()
}

/// A persisted output artifact belonging to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPayload {
    pub id: String,
    pub project_id: String,
    pub kind: String,
    pub uri: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

/// One generation job as recorded in a project's history.
///
/// The id is the task id, so a project holds at most one record per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: String,
    pub prompt: String,
    pub session_id: String,
    pub status: String,
    #[serde(default)]
    pub result_uris: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: EpochMillis,
    #[serde(default)]
    pub completed_at: Option<EpochMillis>,
}

/// A whole project, loaded and saved as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPayload {
    pub manifest: ProjectManifest,
    #[serde(default)]
    pub canvas: serde_json::Value,
    #[serde(default)]
    pub assets: Vec<AssetPayload>,
    #[serde(default)]
    pub history: Vec<GenerationRecord>,
}

impl ProjectPayload {
    /// Insert `asset`, or replace the existing asset with the same id.
    ///
    /// A replaced asset keeps its original `created_at`. Unrelated assets
    /// and their order are left untouched.
    pub fn upsert_asset(&mut self, mut asset: AssetPayload) {
        match self.assets.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => {
                asset.created_at = existing.created_at;
                *existing = asset;
            }
            None => self.assets.push(asset),
        }
    }

    /// Insert `record`, or replace the existing record for the same task.
    pub fn upsert_history(&mut self, record: GenerationRecord) {
        match self.history.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.history.push(record),
        }
    }
}

/// Lightweight listing entry for a project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub manifest: ProjectManifest,
    pub assets_count: usize,
    pub history_count: usize,
}
