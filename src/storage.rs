use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::error::TodoError;

pub const TASKS_KEY: &str = "tasks";
pub const COMPLETED_TASKS_KEY: &str = "completedTasks";
pub const SETTINGS_KEY: &str = "settings";

const PREFERENCES_FILE: &str = "preferences.json";

/// Flat string-to-string store, the only I/O boundary of the registry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>, TodoError>;

    async fn set_string(&self, key: &str, value: &str) -> Result<(), TodoError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, TodoError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), TodoError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Keeps every key in one JSON object file under `root`.
///
/// The file is read lazily on first access and rewritten whole on every
/// `set_string`, through a temp file and a rename.
pub struct FileStore {
    root: PathBuf,
    values: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            values: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(PREFERENCES_FILE)
    }

    pub async fn ensure_dirs(&self) -> Result<(), TodoError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|err| {
            TodoError::store_unavailable(format!("{}: {err}", self.root.display()))
        })
    }

    async fn read_values(&self) -> Result<BTreeMap<String, String>, TodoError> {
        let path = self.path();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(TodoError::store_unavailable(format!(
                    "{}: {err}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&content).map_err(|err| {
            TodoError::format(format!("invalid JSON in {}: {err}", path.display()))
        })
    }

    async fn write_atomic(&self, values: &BTreeMap<String, String>) -> Result<(), TodoError> {
        self.ensure_dirs().await?;
        let path = self.path();
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(values)?;
        {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, TodoError> {
        let mut guard = self.values.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_values().await?);
        }
        Ok(guard.as_ref().and_then(|values| values.get(key).cloned()))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), TodoError> {
        let mut guard = self.values.lock().await;
        let mut next = match guard.as_ref() {
            Some(values) => values.clone(),
            None => self.read_values().await?,
        };
        next.insert(key.to_string(), value.to_string());
        self.write_atomic(&next).await?;
        *guard = Some(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn memory_store_get_and_set() {
        let store = MemoryStore::with_values([(TASKS_KEY, "{}")]);
        assert_eq!(store.get_string(TASKS_KEY).await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.get_string(COMPLETED_TASKS_KEY).await.unwrap(), None);

        store.set_string(COMPLETED_TASKS_KEY, "[]").await.unwrap();
        assert_eq!(
            store.get_string(COMPLETED_TASKS_KEY).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn file_store_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get_string(TASKS_KEY).await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");

        let store = FileStore::new(root.clone());
        store.set_string(TASKS_KEY, "{\"a\":1}").await.unwrap();
        store.set_string(COMPLETED_TASKS_KEY, "[]").await.unwrap();
        assert!(root.join("preferences.json").is_file());
        assert!(!root.join("preferences.tmp").exists());

        let reopened = FileStore::new(root);
        assert_eq!(
            reopened.get_string(TASKS_KEY).await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert_eq!(
            reopened.get_string(COMPLETED_TASKS_KEY).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn file_store_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("preferences.json"), b"{ nope").unwrap();

        let store = FileStore::new(dir.path().to_path_buf());
        let err = store.get_string(TASKS_KEY).await.unwrap_err();
        assert_eq!(err.code(), "format_error");
    }

    #[tokio::test]
    async fn file_store_reports_unavailable_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let store = FileStore::new(blocker.join("data"));
        let err = store.set_string(TASKS_KEY, "{}").await.unwrap_err();
        assert_eq!(err.code(), "store_unavailable");
        // A failed write leaves the cached view untouched.
        assert!(store.values.lock().await.is_none());
    }
}
