//! Filesystem-backed cold storage.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CoreError, Result};

use super::{ColdStorage, blob_location};

/// Cold storage rooted at a local directory.
///
/// Blobs are stored as pretty-printed JSON files under
/// `<root>/<model>/<record_id>.json`. I/O failures other than a missing
/// blob are treated as transient so the pipeline retries them.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create a filesystem storage rooted at `root`.
    ///
    /// The directory is created if it does not exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| CoreError::StorageError {
            location: root.to_string_lossy().into_owned(),
            details: format!("failed to create storage root: {}", e),
        })?;
        Ok(Self { root })
    }

    fn blob_path(&self, location: &str) -> Result<PathBuf> {
        // Locations are engine-generated, but reject path traversal anyway
        // since they are persisted in the mapping table.
        if location.split('/').any(|part| part == "..") || location.starts_with('/') {
            return Err(CoreError::StorageError {
                location: location.to_string(),
                details: "location escapes the storage root".to_string(),
            });
        }
        Ok(self.root.join(location))
    }

    fn transient(location: &str, operation: &str, err: std::io::Error) -> CoreError {
        CoreError::TransientStoreError {
            operation: format!("{} {}", operation, location),
            details: err.to_string(),
        }
    }
}

#[async_trait]
impl ColdStorage for FsStorage {
    async fn export_data(&self, model: &str, record_id: &str, payload: &Value) -> Result<String> {
        let location = blob_location(model, record_id);
        let path = self.blob_path(&location)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::transient(&location, "mkdir", e))?;
        }

        let bytes = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Self::transient(&location, "write", e))?;

        Ok(location)
    }

    async fn import_data(&self, location: &str) -> Result<Value> {
        let path = self.blob_path(location)?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CoreError::StorageError {
                    location: location.to_string(),
                    details: "blob not found".to_string(),
                }
            } else {
                Self::transient(location, "read", e)
            }
        })?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, location: &str) -> Result<()> {
        let path = self.blob_path(location)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::transient(location, "remove", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_export_import_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();

        let payload = json!({"id": "p-1", "name": "soap"});
        let location = storage.export_data("Product", "p-1", &payload).await.unwrap();
        assert_eq!(location, "Product/p-1.json");
        assert!(dir.path().join("Product/p-1.json").exists());

        let back = storage.import_data(&location).await.unwrap();
        assert_eq!(back, payload);

        storage.delete(&location).await.unwrap();
        assert!(!dir.path().join("Product/p-1.json").exists());

        // Deleting an already-missing blob is fine.
        storage.delete(&location).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_transient() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();

        let err = storage.import_data("Product/ghost.json").await.unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_location_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();

        let err = storage.import_data("../outside.json").await.unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");

        let err = storage.import_data("/etc/passwd").await.unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn test_export_overwrites_previous_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();

        storage
            .export_data("Product", "p-1", &json!({"v": 1}))
            .await
            .unwrap();
        let location = storage
            .export_data("Product", "p-1", &json!({"v": 2}))
            .await
            .unwrap();

        let back = storage.import_data(&location).await.unwrap();
        assert_eq!(back, json!({"v": 2}));
    }
}
