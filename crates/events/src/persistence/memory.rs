//! In-process [`ReadingStore`], used when no Redis URL is configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ReadingStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    /// collection -> entity -> blob
    collections: HashMap<String, HashMap<String, String>>,
    /// entity -> collection
    entities: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest blob written for `entity` in `collection`.
    pub fn latest(&self, collection: &str, entity: &str) -> Option<String> {
        self.tables()
            .collections
            .get(collection)
            .and_then(|c| c.get(entity))
            .cloned()
    }

    /// Registered entities and their collections, sorted by entity name.
    pub fn entities(&self) -> Vec<(String, String)> {
        self.tables()
            .entities
            .iter()
            .map(|(e, c)| (e.clone(), c.clone()))
            .collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn write(&self, collection: &str, entity: &str, blob: &str) -> Result<(), StoreError> {
        self.tables()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(entity.to_string(), blob.to_string());
        Ok(())
    }

    async fn register_entity(&self, entity: &str, collection: &str) -> Result<(), StoreError> {
        self.tables()
            .entities
            .insert(entity.to_string(), collection.to_string());
        Ok(())
    }
}
