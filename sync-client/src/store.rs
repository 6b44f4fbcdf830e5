//! Local entity storage.
//!
//! This module provides a trait over the device-local database that holds
//! the user's entities (jobs, resumes, cover letters) and settings
//! documents, plus a memory-based implementation for testing.
//!
//! The sync engine reads and writes through this trait only. It never
//! assumes a particular backend: the CLI stores JSON files on disk, tests
//! use [`MemoryStore`], and embedders can plug in whatever they have.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use sync_types::EntityType;

/// Settings key under which the durable mutation queue is stored.
pub const QUEUE_KEY: &str = "sync-queue";

/// Settings key under which the sync settings document is stored.
pub const SETTINGS_KEY: &str = "sync-settings";

/// Settings key under which the application's own settings document lives.
///
/// Settings pulled from the server are written back under this key.
pub const APP_SETTINGS_KEY: &str = "default";

/// Errors from the local store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading from the backend failed.
    #[error("store read failed: {0}")]
    Read(String),

    /// Writing to the backend failed.
    #[error("store write failed: {0}")]
    Write(String),

    /// Deleting from the backend failed.
    #[error("store delete failed: {0}")]
    Delete(String),
}

/// Trait for the device-local entity database.
///
/// Entities are JSON documents addressed by type and id. Settings are JSON
/// documents addressed by a string key. Missing records read as `None`
/// rather than an error; errors are reserved for backend failures.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Insert or overwrite an entity document.
    async fn save_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        data: Value,
    ) -> Result<(), StoreError>;

    /// Delete an entity document. Deleting a missing entity is not an error.
    async fn delete_entity(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError>;

    /// Read a single entity document.
    async fn entity(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, StoreError>;

    /// Read all entity documents of one type.
    async fn entities(&self, entity_type: EntityType) -> Result<Vec<Value>, StoreError>;

    /// Read a settings document by key.
    async fn setting(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or overwrite a settings document.
    async fn put_setting(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// In-memory store for testing.
///
/// Stores entities and settings in thread-safe HashMaps. Not persistent,
/// all data is lost when the store is dropped. Clones share state.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    entities: HashMap<(EntityType, String), Value>,
    settings: HashMap<String, Value>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count entities of one type currently stored.
    pub fn entity_count(&self, entity_type: EntityType) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .entities
            .keys()
            .filter(|(t, _)| *t == entity_type)
            .count()
    }

    /// Clear all entities and settings.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entities.clear();
        inner.settings.clear();
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn save_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.entities.insert((entity_type, id.to_string()), data);
        Ok(())
    }

    async fn delete_entity(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.entities.remove(&(entity_type, id.to_string()));
        Ok(())
    }

    async fn entity(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entities.get(&(entity_type, id.to_string())).cloned())
    }

    async fn entities(&self, entity_type: EntityType) -> Result<Vec<Value>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entities
            .iter()
            .filter(|((t, _), _)| *t == entity_type)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.settings.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store whose writes fail on demand, for failure-path testing.
///
/// Wraps a [`MemoryStore`]; reads always pass through. When `fail_writes`
/// is set, every write returns [`StoreError::Write`].
#[derive(Default, Clone)]
pub struct FailingStore {
    backing: MemoryStore,
    fail_writes: Arc<Mutex<bool>>,
}

impl FailingStore {
    /// Create a new failing store with writes passing through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle write failure.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    /// Access the backing memory store.
    pub fn backing(&self) -> &MemoryStore {
        &self.backing
    }

    fn should_fail(&self) -> bool {
        *self.fail_writes.lock().unwrap()
    }
}

#[async_trait]
impl LocalStore for FailingStore {
    async fn save_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        data: Value,
    ) -> Result<(), StoreError> {
        if self.should_fail() {
            return Err(StoreError::Write("simulated write failure".to_string()));
        }
        self.backing.save_entity(entity_type, id, data).await
    }

    async fn delete_entity(&self, entity_type: EntityType, id: &str) -> Result<(), StoreError> {
        if self.should_fail() {
            return Err(StoreError::Write("simulated write failure".to_string()));
        }
        self.backing.delete_entity(entity_type, id).await
    }

    async fn entity(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, StoreError> {
        self.backing.entity(entity_type, id).await
    }

    async fn entities(&self, entity_type: EntityType) -> Result<Vec<Value>, StoreError> {
        self.backing.entities(entity_type).await
    }

    async fn setting(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.backing.setting(key).await
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.should_fail() {
            return Err(StoreError::Write("simulated write failure".to_string()));
        }
        self.backing.put_setting(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_save_and_read_entity() {
        let store = MemoryStore::new();
        let data = json!({"id": "job_1", "title": "Engineer"});

        store
            .save_entity(EntityType::Job, "job_1", data.clone())
            .await
            .unwrap();

        let read = store.entity(EntityType::Job, "job_1").await.unwrap();
        assert_eq!(read, Some(data));
    }

    #[tokio::test]
    async fn memory_store_missing_entity_is_none() {
        let store = MemoryStore::new();

        let read = store.entity(EntityType::Job, "nope").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn memory_store_entities_filters_by_type() {
        let store = MemoryStore::new();
        store
            .save_entity(EntityType::Job, "job_1", json!({"id": "job_1"}))
            .await
            .unwrap();
        store
            .save_entity(EntityType::Job, "job_2", json!({"id": "job_2"}))
            .await
            .unwrap();
        store
            .save_entity(EntityType::Resume, "res_1", json!({"id": "res_1"}))
            .await
            .unwrap();

        let jobs = store.entities(EntityType::Job).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(store.entity_count(EntityType::Resume), 1);
    }

    #[tokio::test]
    async fn memory_store_delete_entity() {
        let store = MemoryStore::new();
        store
            .save_entity(EntityType::Job, "job_1", json!({"id": "job_1"}))
            .await
            .unwrap();

        store.delete_entity(EntityType::Job, "job_1").await.unwrap();

        assert!(store
            .entity(EntityType::Job, "job_1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn memory_store_delete_missing_is_ok() {
        let store = MemoryStore::new();
        store.delete_entity(EntityType::Job, "nope").await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_settings_roundtrip() {
        let store = MemoryStore::new();
        let value = json!({"theme": "dark"});

        store
            .put_setting(APP_SETTINGS_KEY, value.clone())
            .await
            .unwrap();

        let read = store.setting(APP_SETTINGS_KEY).await.unwrap();
        assert_eq!(read, Some(value));
        assert!(store.setting(QUEUE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_save_overwrites() {
        let store = MemoryStore::new();
        store
            .save_entity(EntityType::Job, "job_1", json!({"version": 1}))
            .await
            .unwrap();
        store
            .save_entity(EntityType::Job, "job_1", json!({"version": 2}))
            .await
            .unwrap();

        let read = store.entity(EntityType::Job, "job_1").await.unwrap();
        assert_eq!(read.unwrap()["version"], 2);
        assert_eq!(store.entity_count(EntityType::Job), 1);
    }

    #[tokio::test]
    async fn memory_store_clone_shares_state() {
        let store1 = MemoryStore::new();
        let store2 = store1.clone();

        store1
            .save_entity(EntityType::Job, "job_1", json!({"id": "job_1"}))
            .await
            .unwrap();

        assert!(store2
            .entity(EntityType::Job, "job_1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn failing_store_blocks_writes_on_demand() {
        let store = FailingStore::new();
        store
            .save_entity(EntityType::Job, "job_1", json!({"v": 1}))
            .await
            .unwrap();

        store.set_fail_writes(true);
        let result = store.save_entity(EntityType::Job, "job_2", json!({"v": 1})).await;
        assert!(matches!(result, Err(StoreError::Write(_))));

        // Reads still pass through.
        assert!(store
            .entity(EntityType::Job, "job_1")
            .await
            .unwrap()
            .is_some());

        store.set_fail_writes(false);
        store
            .save_entity(EntityType::Job, "job_2", json!({"v": 1}))
            .await
            .unwrap();
    }
}
