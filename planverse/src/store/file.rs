//! File-backed task store.
//!
//! Each collection is one JSON array at `<root>/users/<uid>/tasks.json`.
//! Every write is a read-modify-write of that file, serialized through one
//! async mutex per store, and lands via a temp file plus rename so a crash
//! never leaves a half-written document array behind.

use std::path::PathBuf;

use tokio::sync::Mutex;

use planverse_proto::task::sort_by_due_date;
use planverse_proto::{CollectionPath, Task, TaskId};

use super::{StoreError, TaskStore, new_document_id};

/// Task store that persists collections as JSON files under a root directory.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the file that holds a collection.
    #[must_use]
    pub fn collection_file(&self, path: &CollectionPath) -> PathBuf {
        self.root
            .join("users")
            .join(path.user_id())
            .join("tasks.json")
    }

    async fn read_collection(&self, path: &CollectionPath) -> Result<Vec<Task>, StoreError> {
        match tokio::fs::read(self.collection_file(path)).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_collection(&self, path: &CollectionPath, tasks: &[Task]) -> Result<(), StoreError> {
        let file = self.collection_file(path);
        if let Some(dir) = file.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec_pretty(tasks)?;
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &file).await?;
        Ok(())
    }
}

impl TaskStore for JsonFileStore {
    async fn create(&self, path: &CollectionPath, task: &Task) -> Result<TaskId, StoreError> {
        task.validate()?;
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.read_collection(path).await?;
        let id = new_document_id();
        tasks.push(task.clone().with_id(id.clone()));
        self.write_collection(path, &tasks).await?;
        tracing::debug!(%path, %id, "file store created document");
        Ok(id)
    }

    async fn update(&self, path: &CollectionPath, id: &TaskId, task: &Task) -> Result<(), StoreError> {
        task.validate()?;
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.read_collection(path).await?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id.as_ref() == Some(id))
            .ok_or_else(|| StoreError::NotFound(path.document(id)))?;
        *slot = task.clone().with_id(id.clone());
        self.write_collection(path, &tasks).await
    }

    async fn delete(&self, path: &CollectionPath, id: &TaskId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.read_collection(path).await?;
        let before = tasks.len();
        tasks.retain(|t| t.id.as_ref() != Some(id));
        if tasks.len() == before {
            return Ok(());
        }
        self.write_collection(path, &tasks).await
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.read_collection(path).await?;
        sort_by_due_date(&mut tasks);
        Ok(tasks)
    }
}
