//! Merging finished generation results into project storage.
//!
//! [`AssetPersister::persist`] downloads every remote result of a task into
//! the project's asset directory, then upserts one asset per result and one
//! history record for the task. Assets and history are keyed by id, so
//! persisting the same task again replaces its entries instead of adding
//! new ones, and unrelated entries are never touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dreamcanvas_core::error::CoreError;
use dreamcanvas_core::project::{AssetPayload, GenerationRecord, ASSET_KIND_IMAGE};
use dreamcanvas_core::storage::ProjectStore;
use dreamcanvas_core::task::{GenerationTask, TaskStatus};
use dreamcanvas_core::types::now_millis;
use dreamcanvas_jimeng::JobClient;
use serde_json::json;
use tokio::sync::Mutex;

/// Extensions kept when naming downloaded files. Anything else is saved as png.
const KNOWN_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];
const DEFAULT_EXTENSION: &str = "png";

/// What a persist run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    /// Assets upserted into the project, in result order.
    pub assets: Vec<AssetPayload>,
    /// Paths of the files that were downloaded.
    pub local_paths: Vec<String>,
}

/// Downloads task results and merges them into projects.
pub struct AssetPersister {
    client: Arc<dyn JobClient>,
    store: Arc<dyn ProjectStore>,
    /// Serializes load-merge-save across tasks.
    write_lock: Mutex<()>,
}

impl AssetPersister {
    pub fn new(client: Arc<dyn JobClient>, store: Arc<dyn ProjectStore>) -> Self {
        Self {
            client,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Persist the results of `task` into project `project_id`.
    ///
    /// Downloads that fail keep the remote URL as the asset URI. Errors
    /// loading or saving the project are returned.
    pub async fn persist(
        &self,
        task: &GenerationTask,
        project_id: &str,
    ) -> Result<PersistOutcome, CoreError> {
        // Fail early, before downloading anything, if the project is gone.
        self.store.load_project(project_id).await?;

        let asset_dir = self.store.asset_dir(project_id);
        let mut final_uris = Vec::with_capacity(task.result_uris.len());
        let mut local_paths = Vec::new();
        let mut assets = Vec::with_capacity(task.result_uris.len());
        let now = now_millis();

        for (index, uri) in task.result_uris.iter().enumerate() {
            let asset_id = format!("{}-{}", task.task_id, index + 1);
            let mut metadata = serde_json::Map::new();
            metadata.insert("taskId".into(), json!(task.task_id));
            metadata.insert("prompt".into(), json!(task.prompt));
            metadata.insert("model".into(), json!(task.metadata.model));
            metadata.insert("size".into(), json!(task.metadata.size));

            let stored_uri = if is_remote(uri) {
                metadata.insert("sourceUri".into(), json!(uri));
                match self.download(uri, &asset_dir, &asset_id).await {
                    Ok(path) => {
                        let path = path.to_string_lossy().into_owned();
                        local_paths.push(path.clone());
                        path
                    }
                    Err(e) => {
                        tracing::warn!(
                            task_id = %task.task_id,
                            uri = %uri,
                            error = %e,
                            "Asset download failed, keeping remote URL",
                        );
                        uri.clone()
                    }
                }
            } else {
                uri.clone()
            };

            final_uris.push(stored_uri.clone());
            assets.push(AssetPayload {
                id: asset_id,
                project_id: project_id.to_string(),
                kind: ASSET_KIND_IMAGE.to_string(),
                uri: stored_uri,
                metadata,
                created_at: now,
                updated_at: now,
            });
        }

        let record = GenerationRecord {
            id: task.task_id.clone(),
            prompt: task.prompt.clone(),
            session_id: task
                .metadata
                .history_id
                .clone()
                .unwrap_or_else(|| task.task_id.clone()),
            status: TaskStatus::Succeeded.as_str().to_string(),
            result_uris: final_uris,
            error: None,
            created_at: task.created_at,
            completed_at: Some(now),
        };

        {
            let _guard = self.write_lock.lock().await;
            let mut project = self.store.load_project(project_id).await?;
            for asset in &assets {
                project.upsert_asset(asset.clone());
            }
            project.upsert_history(record);
            self.store.save_project(project).await?;
        }

        tracing::info!(
            task_id = %task.task_id,
            project_id,
            assets = assets.len(),
            downloaded = local_paths.len(),
            "Task assets persisted",
        );

        Ok(PersistOutcome {
            assets,
            local_paths,
        })
    }

    /// Download `url` to `<dir>/<asset_id>.<ext>`.
    async fn download(&self, url: &str, dir: &Path, asset_id: &str) -> Result<PathBuf, CoreError> {
        let bytes = self
            .client
            .fetch_resource(url)
            .await
            .map_err(|e| CoreError::Persistence(format!("download failed: {e}")))?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{asset_id}.{}", extension_of(url)));
        let tmp = dir.join(format!(".{asset_id}.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(path)
    }
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// File extension taken from the URL path, if it is a known image type.
fn extension_of(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    KNOWN_EXTENSIONS
        .iter()
        .copied()
        .find(|known| *known == ext)
        .unwrap_or(DEFAULT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use dreamcanvas_core::storage::ProjectStorage;
    use dreamcanvas_core::task::TaskMetadata;
    use dreamcanvas_jimeng::{GenerationParams, JimengError, SubmissionResult};

    use super::*;

    /// Serves fixed bytes, failing for URLs containing "broken".
    struct Downloads {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobClient for Downloads {
        fn account_label(&self) -> &str {
            "test"
        }

        async fn submit(&self, _: &GenerationParams) -> Result<SubmissionResult, JimengError> {
            unreachable!("not used by the persister")
        }

        async fn fetch_status(&self, _: &str) -> Result<SubmissionResult, JimengError> {
            unreachable!("not used by the persister")
        }

        async fn fetch_resource(&self, url: &str) -> Result<Vec<u8>, JimengError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(JimengError::Http {
                    status: 404,
                    body: "missing".into(),
                });
            }
            Ok(b"image-bytes".to_vec())
        }
    }

    fn task(id: &str, uris: &[&str]) -> GenerationTask {
        GenerationTask {
            task_id: id.to_string(),
            prompt: "a lighthouse".to_string(),
            status: TaskStatus::Succeeded,
            metadata: TaskMetadata {
                model: "3.0".into(),
                size: "1024x1024".into(),
                batch: 1,
                history_id: Some(id.to_string()),
                ..TaskMetadata::default()
            },
            result_uris: uris.iter().map(|u| u.to_string()).collect(),
            error_code: None,
            error_message: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    async fn setup() -> (tempfile::TempDir, Arc<ProjectStorage>, AssetPersister, Arc<Downloads>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ProjectStorage::open(dir.path()).await.unwrap());
        let client = Arc::new(Downloads {
            calls: AtomicUsize::new(0),
        });
        let persister = AssetPersister::new(client.clone(), storage.clone());
        (dir, storage, persister, client)
    }

    #[test]
    fn extension_from_url() {
        assert_eq!(extension_of("https://cdn/x/a.JPG?sig=1"), "jpg");
        assert_eq!(extension_of("https://cdn/x/a.webp#frag"), "webp");
        assert_eq!(extension_of("https://cdn/x/image"), "png");
        assert_eq!(extension_of("https://cdn.example/x/a.tiff"), "png");
    }

    #[tokio::test]
    async fn writes_one_asset_per_result_and_a_history_record() {
        let (_dir, storage, persister, _) = setup().await;
        let project = storage.create_project("Demo").await.unwrap();
        let pid = project.manifest.id.clone();

        let t = task("h1", &["https://mock/a.png", "https://mock/b.jpg"]);
        let outcome = persister.persist(&t, &pid).await.unwrap();

        assert_eq!(outcome.assets.len(), 2);
        assert_eq!(outcome.local_paths.len(), 2);
        assert!(outcome.local_paths[1].ends_with("h1-2.jpg"));
        assert!(Path::new(&outcome.local_paths[0]).exists());

        let loaded = storage.load_project(&pid).await.unwrap();
        let ids: Vec<_> = loaded.assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["h1-1", "h1-2"]);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].id, "h1");
        assert_eq!(loaded.history[0].session_id, "h1");
        assert_eq!(loaded.history[0].status, "succeeded");
        assert_eq!(loaded.history[0].result_uris, outcome.local_paths);
        assert_eq!(loaded.assets[0].metadata["sourceUri"], "https://mock/a.png");
    }

    #[tokio::test]
    async fn persisting_twice_does_not_duplicate() {
        let (_dir, storage, persister, _) = setup().await;
        let pid = storage.create_project("Demo").await.unwrap().manifest.id;

        let t = task("h2", &["https://mock/a.png"]);
        persister.persist(&t, &pid).await.unwrap();
        let first = storage.load_project(&pid).await.unwrap();
        persister.persist(&t, &pid).await.unwrap();
        let second = storage.load_project(&pid).await.unwrap();

        assert_eq!(second.assets.len(), 1);
        assert_eq!(second.history.len(), 1);
        assert_eq!(second.assets[0].created_at, first.assets[0].created_at);
    }

    #[tokio::test]
    async fn unrelated_entries_survive_the_merge() {
        let (_dir, storage, persister, _) = setup().await;
        let pid = storage.create_project("Demo").await.unwrap().manifest.id;

        persister
            .persist(&task("first", &["https://mock/1.png"]), &pid)
            .await
            .unwrap();
        persister
            .persist(&task("second", &["https://mock/2.png"]), &pid)
            .await
            .unwrap();

        let loaded = storage.load_project(&pid).await.unwrap();
        assert_eq!(loaded.assets.len(), 2);
        assert_eq!(loaded.history.len(), 2);
    }

    #[tokio::test]
    async fn failed_download_keeps_remote_url() {
        let (_dir, storage, persister, client) = setup().await;
        let pid = storage.create_project("Demo").await.unwrap().manifest.id;

        let t = task("h3", &["https://mock/broken.png", "data/local.png"]);
        let outcome = persister.persist(&t, &pid).await.unwrap();

        assert!(outcome.local_paths.is_empty());
        assert_eq!(outcome.assets[0].uri, "https://mock/broken.png");
        assert_eq!(outcome.assets[1].uri, "data/local.png");
        // Only the remote URI is fetched.
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_project_is_an_error() {
        let (_dir, _storage, persister, client) = setup().await;
        let result = persister
            .persist(&task("h4", &["https://mock/a.png"]), "nope")
            .await;
        assert_matches!(result, Err(CoreError::NotFound { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
