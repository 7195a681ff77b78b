//! In-memory cold storage for tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{CoreError, Result};

use super::{ColdStorage, blob_location};

/// Cold storage backed by an in-process map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    /// Whether the storage holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    /// Look up a blob without going through the adapter interface.
    pub async fn get(&self, location: &str) -> Option<Value> {
        self.blobs.lock().await.get(location).cloned()
    }
}

#[async_trait]
impl ColdStorage for MemoryStorage {
    async fn export_data(&self, model: &str, record_id: &str, payload: &Value) -> Result<String> {
        let location = blob_location(model, record_id);
        self.blobs
            .lock()
            .await
            .insert(location.clone(), payload.clone());
        Ok(location)
    }

    async fn import_data(&self, location: &str) -> Result<Value> {
        self.blobs
            .lock()
            .await
            .get(location)
            .cloned()
            .ok_or_else(|| CoreError::StorageError {
                location: location.to_string(),
                details: "blob not found".to_string(),
            })
    }

    async fn delete(&self, location: &str) -> Result<()> {
        self.blobs.lock().await.remove(location);
        Ok(())
    }
}
