//! Driver private storage: per share/snapshot key-value metadata.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, WfaError};
use crate::lock::open_lock_file;

/// Metadata of one share or snapshot.
pub type Details = HashMap<String, String>;

/// Persistent metadata keyed by share or snapshot id.
#[async_trait]
pub trait PrivateStorage: Send + Sync {
    /// Merge `details` into the entry for `entity_id`.
    async fn update(&self, entity_id: &str, details: Details) -> Result<()>;

    async fn get(&self, entity_id: &str) -> Result<Option<Details>>;

    async fn delete(&self, entity_id: &str) -> Result<()>;
}

/// Storage kept in memory for the lifetime of the process.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<RwLock<HashMap<String, Details>>>,
}

impl InMemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrivateStorage for InMemoryStorage {
    async fn update(&self, entity_id: &str, details: Details) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries
            .entry(entity_id.to_string())
            .or_default()
            .extend(details);
        Ok(())
    }

    async fn get(&self, entity_id: &str) -> Result<Option<Details>> {
        Ok(self.entries.read().await.get(entity_id).cloned())
    }

    async fn delete(&self, entity_id: &str) -> Result<()> {
        self.entries.write().await.remove(entity_id);
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Storage backed by a single JSON document on disk.
///
/// Every update rewrites the whole file through a temporary file renamed into
/// place. Writers in all processes serialize on an advisory lock held on
/// `<path>.lock`.
pub struct JsonFileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Create a storage reading and writing `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Block until no other writer, in any process, holds the file.
    async fn lock_writers(&self) -> Result<File> {
        self.ensure_parent().await?;
        let lock_path = with_suffix(&self.path, ".lock");
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| WfaError::Storage(format!("storage lock task failed: {}", e)))?
        .map_err(WfaError::from)
    }

    async fn load(&self) -> Result<HashMap<String, Details>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                WfaError::Storage(format!("{} is not valid JSON: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, entries: &HashMap<String, Details>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let staging = with_suffix(&self.path, ".tmp");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    async fn modify<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, Details>) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let _file_lock = self.lock_writers().await?;
        let mut entries = self.load().await?;
        if change(&mut entries) {
            self.store(&entries).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PrivateStorage for JsonFileStorage {
    async fn update(&self, entity_id: &str, details: Details) -> Result<()> {
        self.modify(|entries| {
            entries
                .entry(entity_id.to_string())
                .or_default()
                .extend(details);
            true
        })
        .await
    }

    async fn get(&self, entity_id: &str) -> Result<Option<Details>> {
        Ok(self.load().await?.remove(entity_id))
    }

    async fn delete(&self, entity_id: &str) -> Result<()> {
        self.modify(|entries| entries.remove(entity_id).is_some())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn details(pairs: &[(&str, &str)]) -> Details {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_in_memory_merges_updates() {
        let storage = InMemoryStorage::new();
        storage
            .update("share-1", details(&[("jobId", "1"), ("jobStatus", "RUNNING")]))
            .await
            .unwrap();
        storage
            .update("share-1", details(&[("jobStatus", "COMPLETED")]))
            .await
            .unwrap();

        let stored = storage.get("share-1").await.unwrap().unwrap();
        assert_eq!(stored, details(&[("jobId", "1"), ("jobStatus", "COMPLETED")]));

        storage.delete("share-1").await.unwrap();
        assert!(storage.get("share-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_persists_between_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("private.json");

        let storage = JsonFileStorage::new(&path);
        assert!(storage.get("snap-1").await.unwrap().is_none());
        storage
            .update("snap-1", details(&[("jobId", "42")]))
            .await
            .unwrap();

        let reopened = JsonFileStorage::new(&path);
        let stored = reopened.get("snap-1").await.unwrap().unwrap();
        assert_eq!(stored.get("jobId").map(String::as_str), Some("42"));

        reopened.delete("snap-1").await.unwrap();
        assert!(storage.get("snap-1").await.unwrap().is_none());
        assert!(!with_suffix(&path, ".tmp").exists());
    }

    #[tokio::test]
    async fn test_json_file_concurrent_writers_keep_every_update() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("private.json");
        // Separate instances share nothing but the file, like separate processes.
        let first = Arc::new(JsonFileStorage::new(&path));
        let second = Arc::new(JsonFileStorage::new(&path));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let storage = if i % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                storage
                    .update(&format!("share-{}", i), details(&[("jobId", "1")]))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reopened = JsonFileStorage::new(&path);
        for i in 0..20 {
            assert!(
                reopened.get(&format!("share-{}", i)).await.unwrap().is_some(),
                "share-{} lost",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_json_file_rejects_corrupt_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("private.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = JsonFileStorage::new(&path);
        assert!(matches!(
            storage.get("x").await,
            Err(WfaError::Storage(_))
        ));
    }
}
