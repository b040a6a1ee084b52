//! Project persistence.
//!
//! [`ProjectStore`] is the contract the task core relies on: load and save a
//! project as one unit, and know where a project's downloaded assets live.
//! [`ProjectStorage`] implements it on the local filesystem:
//!
//! ```text
//! <root>/<project_id>/manifest.json
//! <root>/<project_id>/canvas.json
//! <root>/<project_id>/assets.json
//! <root>/<project_id>/history.json
//! <root>/<project_id>/assets/images/...
//! ```
//!
//! Every document is written atomically (temp file + rename).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backup::archive_dir;
use crate::error::CoreError;
use crate::hashing::json_sha256_hex;
use crate::project::{
    AssetPayload, GenerationRecord, ProjectManifest, ProjectPayload, ProjectSummary,
    PROJECT_VERSION,
};
use crate::types::now_millis;

/// Maximum accepted length of a project id.
const MAX_PROJECT_ID_LEN: usize = 128;

/// Load/save access to project documents.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Load a project. Fails with [`CoreError::NotFound`] if it does not exist.
    async fn load_project(&self, project_id: &str) -> Result<ProjectPayload, CoreError>;

    /// Save a project, returning the payload as written (with refreshed
    /// `updated_at` and canvas checksum).
    async fn save_project(&self, payload: ProjectPayload) -> Result<ProjectPayload, CoreError>;

    /// Directory where downloaded image assets of a project are stored.
    fn asset_dir(&self, project_id: &str) -> PathBuf;
}

/// Reject ids that are empty, too long, or could escape the storage root.
pub fn validate_project_id(project_id: &str) -> Result<(), CoreError> {
    let valid = !project_id.is_empty()
        && project_id.len() <= MAX_PROJECT_ID_LEN
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid project id: '{project_id}'"
        )))
    }
}

/// Checksum of a canvas document, over its sorted-key JSON text.
pub fn canvas_checksum(canvas: &serde_json::Value) -> Result<String, CoreError> {
    Ok(json_sha256_hex(canvas)?)
}

// ---------------------------------------------------------------------------
// Filesystem implementation
// ---------------------------------------------------------------------------

/// File-backed project store rooted at a projects directory.
#[derive(Debug, Clone)]
pub struct ProjectStorage {
    root: PathBuf,
}

impl ProjectStorage {
    /// Open (and create if needed) a storage root.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn manifest_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("manifest.json")
    }

    fn canvas_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("canvas.json")
    }

    fn assets_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("assets.json")
    }

    fn history_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("history.json")
    }

    /// Create an empty project with a fresh id.
    pub async fn create_project(&self, name: &str) -> Result<ProjectPayload, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "Project name must not be empty".to_string(),
            ));
        }

        let project_id = uuid::Uuid::new_v4().simple().to_string();
        let now = now_millis();
        let manifest = ProjectManifest {
            id: project_id.clone(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            version: PROJECT_VERSION.to_string(),
            canvas_checksum: String::new(),
        };

        tokio::fs::create_dir_all(self.project_dir(&project_id)).await?;
        write_json_atomic(&self.manifest_path(&project_id), &manifest).await?;
        write_json_atomic(&self.canvas_path(&project_id), &serde_json::json!({})).await?;
        write_json_atomic(&self.assets_path(&project_id), &Vec::<AssetPayload>::new()).await?;
        write_json_atomic(
            &self.history_path(&project_id),
            &Vec::<GenerationRecord>::new(),
        )
        .await?;

        tracing::info!(project_id = %project_id, name = %name, "Project created");
        self.load_project(&project_id).await
    }

    /// List all readable projects, ordered by id.
    ///
    /// Directories without a parseable manifest are skipped.
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, CoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let manifest = match read_json::<ProjectManifest>(&self.manifest_path(&id)).await {
                Ok(Some(manifest)) => manifest,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(project_id = %id, error = %e, "Skipping unreadable project");
                    continue;
                }
            };
            let assets: Vec<serde_json::Value> = read_json(&self.assets_path(&id))
                .await
                .unwrap_or_default()
                .unwrap_or_default();
            let history: Vec<serde_json::Value> = read_json(&self.history_path(&id))
                .await
                .unwrap_or_default()
                .unwrap_or_default();
            summaries.push(ProjectSummary {
                manifest,
                assets_count: assets.len(),
                history_count: history.len(),
            });
        }
        Ok(summaries)
    }

    /// Zip the whole storage root into `backups_dir`, returning the archive
    /// path (`<UTC timestamp>-projects.zip`).
    pub async fn backup(&self, backups_dir: &Path) -> Result<PathBuf, CoreError> {
        let stem = format!("{}-projects", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
        archive_dir(&self.root, backups_dir, &stem).await
    }

    /// Storage overview for the diagnostics endpoint.
    pub async fn diagnostics(&self) -> Result<serde_json::Value, CoreError> {
        let summaries = self.list_projects().await?;
        let projects: Vec<_> = summaries
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.manifest.id,
                    "name": s.manifest.name,
                    "updatedAt": s.manifest.updated_at,
                    "assets": s.assets_count,
                    "history": s.history_count,
                })
            })
            .collect();
        Ok(serde_json::json!({
            "projectCount": summaries.len(),
            "projects": projects,
        }))
    }
}

#[async_trait]
impl ProjectStore for ProjectStorage {
    async fn load_project(&self, project_id: &str) -> Result<ProjectPayload, CoreError> {
        validate_project_id(project_id)?;

        let manifest: ProjectManifest = read_json(&self.manifest_path(project_id))
            .await?
            .ok_or_else(|| CoreError::not_found("Project", project_id))?;
        let canvas = read_json(&self.canvas_path(project_id))
            .await?
            .unwrap_or_else(|| serde_json::json!({}));
        let assets = read_json(&self.assets_path(project_id))
            .await?
            .unwrap_or_default();
        let history = read_json(&self.history_path(project_id))
            .await?
            .unwrap_or_default();

        Ok(ProjectPayload {
            manifest,
            canvas,
            assets,
            history,
        })
    }

    async fn save_project(&self, payload: ProjectPayload) -> Result<ProjectPayload, CoreError> {
        let project_id = payload.manifest.id.clone();
        validate_project_id(&project_id)?;

        let mut manifest = payload.manifest;
        manifest.updated_at = now_millis();
        manifest.canvas_checksum = canvas_checksum(&payload.canvas)?;

        tokio::fs::create_dir_all(self.project_dir(&project_id)).await?;
        write_json_atomic(&self.manifest_path(&project_id), &manifest).await?;
        write_json_atomic(&self.canvas_path(&project_id), &payload.canvas).await?;
        write_json_atomic(&self.assets_path(&project_id), &payload.assets).await?;
        write_json_atomic(&self.history_path(&project_id), &payload.history).await?;

        tracing::debug!(
            project_id = %project_id,
            assets = payload.assets.len(),
            history = payload.history.len(),
            "Project saved",
        );

        Ok(ProjectPayload {
            manifest,
            canvas: payload.canvas,
            assets: payload.assets,
            history: payload.history,
        })
    }

    fn asset_dir(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("assets").join("images")
    }
}

// ---- private helpers ----

/// Serialize `value` as pretty JSON and move it into place atomically.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let tmp_path = path.with_file_name(format!(
        ".{file_name}.{}.tmp",
        uuid::Uuid::new_v4().simple()
    ));
    tokio::fs::write(&tmp_path, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Read and parse a JSON document. Returns `Ok(None)` if the file is absent.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
