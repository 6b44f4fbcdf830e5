//! JSON-file storage for the CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sync_client::{LocalStore, StoreError};
use sync_types::EntityType;
use tokio::sync::Mutex;

/// A [`LocalStore`] backed by JSON files under the data directory.
///
/// Each entity type lives in one file (`store/jobs.json` and friends) as
/// an object keyed by entity id. Settings documents share
/// `store/settings.json`, keyed by setting name; the engine's queue,
/// sync settings, and watermark live there alongside the application's
/// own settings document, and a settings entity row is the same slot as
/// its setting key.
///
/// Writes replace the whole file through a rename, so a concurrent
/// reader never sees a half-written document. Mutations serialize on
/// one lock.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `<data_dir>/store`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("store"),
            write_lock: Mutex::new(()),
        }
    }

    fn file_name(entity_type: EntityType) -> &'static str {
        match entity_type {
            EntityType::Job => "jobs.json",
            EntityType::Resume => "resumes.json",
            EntityType::CoverLetter => "cover_letters.json",
            EntityType::Settings => "settings.json",
        }
    }

    async fn read_map(&self, file: &'static str) -> Result<Map<String, Value>, StoreError> {
        let path = self.root.join(file);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(StoreError::Read(e.to_string())),
        };
        serde_json::from_slice(&contents).map_err(|e| StoreError::Read(e.to_string()))
    }

    async fn write_map(
        &self,
        file: &'static str,
        map: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        let contents =
            serde_json::to_vec_pretty(map).map_err(|e| StoreError::Write(e.to_string()))?;
        let tmp = self.root.join(format!("{file}.tmp"));
        tokio::fs::write(&tmp, &contents)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        tokio::fs::rename(&tmp, self.root.join(file))
            .await
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

#[async_trait]
impl LocalStore for FileStore {
    async fn save_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        let file = Self::file_name(entity_type);
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map(file).await?;
        map.insert(id.to_string(), data);
        self.write_map(file, &map).await
    }

    async fn delete_entity(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError> {
        let file = Self::file_name(entity_type);
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map(file).await?;
        if map.remove(id).is_none() {
            return Ok(());
        }
        match self.write_map(file, &map).await {
            Err(StoreError::Write(msg)) => Err(StoreError::Delete(msg)),
            other => other,
        }
    }

    async fn entity(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, StoreError> {
        let map = self.read_map(Self::file_name(entity_type)).await?;
        Ok(map.get(id).cloned())
    }

    async fn entities(&self, entity_type: EntityType) -> Result<Vec<Value>, StoreError> {
        let map = self.read_map(Self::file_name(entity_type)).await?;
        Ok(map.into_iter().map(|(_, value)| value).collect())
    }

    async fn setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let map = self.read_map(Self::file_name(EntityType::Settings)).await?;
        Ok(map.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let file = Self::file_name(EntityType::Settings);
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map(file).await?;
        map.insert(key.to_string(), value);
        self.write_map(file, &map).await
    }
}
