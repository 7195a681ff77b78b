// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cold storage adapters.
//!
//! The pipeline reads and writes archived records through the
//! [`ColdStorage`] trait. Blobs are addressed by a location string keyed
//! by model name and record identifier; the serialized form is JSON.
//!
//! Two backends ship with the engine: a filesystem directory tree
//! ([`FsStorage`]) and an in-memory map ([`MemoryStorage`]) for tests
//! and demos. Remote object stores (e.g. S3) are boundary
//! implementations of the same trait.

pub mod fs;
pub mod memory;

pub use self::fs::FsStorage;
pub use self::memory::MemoryStorage;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Long-term storage for archived records.
#[async_trait]
pub trait ColdStorage: Send + Sync {
    /// Write one serialized record and return its location.
    ///
    /// Locations are stable for a given model and record id, so a
    /// retried export overwrites its own partial blob instead of leaking
    /// an orphan.
    async fn export_data(&self, model: &str, record_id: &str, payload: &Value) -> Result<String>;

    /// Read one serialized record back from a location.
    async fn import_data(&self, location: &str) -> Result<Value>;

    /// Remove a blob. Missing blobs are not an error.
    async fn delete(&self, location: &str) -> Result<()>;
}

/// The location key for a record blob: `<model>/<record_id>.json`.
pub(crate) fn blob_location(model: &str, record_id: &str) -> String {
    format!("{}/{}.json", model, record_id)
}
