// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for coldline-core E2E tests.
//!
//! Provides TestContext wiring an in-memory SQLite database, in-memory
//! cold storage and a pipeline worker driven manually via `run_once`.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use coldline_core::error::{CoreError, Result};
use coldline_core::jobs::{JobService, ModelRegistry};
use coldline_core::persistence::{
    Persistence, ProductRecord, SqlitePersistence,
};
use coldline_core::pipeline::{PipelineConfig, PipelineWorker};
use coldline_core::storage::{ColdStorage, MemoryStorage};

/// Test context with database, storage, job service and pipeline worker.
pub struct TestContext {
    pub persistence: Arc<SqlitePersistence>,
    pub storage: Arc<MemoryStorage>,
    pub jobs: JobService,
    pub worker: PipelineWorker,
}

impl TestContext {
    /// Set up an isolated context backed by an in-memory database.
    pub async fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new())).await
    }

    /// Set up a context whose pipeline writes through `pipeline_storage`.
    ///
    /// The context's own `storage` field keeps direct access to the
    /// underlying in-memory blobs for assertions.
    pub async fn with_pipeline_storage(
        pipeline_storage: Arc<dyn ColdStorage>,
        blobs: Arc<MemoryStorage>,
    ) -> Self {
        let persistence = Arc::new(
            SqlitePersistence::in_memory()
                .await
                .expect("in-memory database"),
        );
        let jobs = JobService::new(persistence.clone(), ModelRegistry::with_defaults());
        let worker = PipelineWorker::new(
            persistence.clone(),
            pipeline_storage,
            test_pipeline_config(),
        );
        Self {
            persistence,
            storage: blobs,
            jobs,
            worker,
        }
    }

    async fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        Self::with_pipeline_storage(storage.clone(), storage).await
    }

    /// Insert a product with generated id and timestamps.
    pub async fn insert_product(&self, name: &str, price: i64) -> ProductRecord {
        let now = Utc::now();
        let product = ProductRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: Some(format!("{} description", name)),
            price,
            created_on: now,
            modified_on: now,
        };
        self.persistence
            .create_product(&product)
            .await
            .expect("insert product");
        product
    }

    /// Count live products.
    pub async fn live_count(&self) -> i64 {
        self.persistence
            .count_products(None)
            .await
            .expect("count products")
    }

    /// Count archive mappings.
    pub async fn mapping_count(&self) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM archive_mappings")
            .fetch_one(self.persistence.pool())
            .await
            .expect("count mappings")
            .0
    }
}

/// Fast retries so failure tests do not sleep for real.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval: Duration::from_millis(10),
        max_attempts: 3,
        retry_base_delay: Duration::from_millis(1),
    }
}

/// Cold storage double that fails a configurable number of operations
/// transiently before delegating to an in-memory backend.
pub struct FlakyStorage {
    inner: MemoryStorage,
    export_failures: AtomicU32,
    import_failures: AtomicU32,
}

impl FlakyStorage {
    pub fn new(export_failures: u32, import_failures: u32) -> Self {
        Self {
            inner: MemoryStorage::new(),
            export_failures: AtomicU32::new(export_failures),
            import_failures: AtomicU32::new(import_failures),
        }
    }

    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    fn take_failure(counter: &AtomicU32, operation: &str) -> Result<()> {
        let remaining = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            Err(CoreError::TransientStoreError {
                operation: operation.to_string(),
                details: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ColdStorage for FlakyStorage {
    async fn export_data(&self, model: &str, record_id: &str, payload: &Value) -> Result<String> {
        Self::take_failure(&self.export_failures, "export")?;
        self.inner.export_data(model, record_id, payload).await
    }

    async fn import_data(&self, location: &str) -> Result<Value> {
        Self::take_failure(&self.import_failures, "import")?;
        self.inner.import_data(location).await
    }

    async fn delete(&self, location: &str) -> Result<()> {
        self.inner.delete(location).await
    }
}
