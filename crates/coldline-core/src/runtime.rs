// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for coldline-core.
//!
//! This module provides [`ArchivalRuntime`] which allows embedding the
//! archival engine into an existing tokio application instead of running
//! it behind the bundled HTTP server.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use coldline_core::persistence::SqlitePersistence;
//! use coldline_core::runtime::ArchivalRuntime;
//! use coldline_core::storage::FsStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let persistence = Arc::new(SqlitePersistence::from_path("coldline.db").await?);
//!     let storage = Arc::new(FsStorage::new(".data/cold-storage")?);
//!
//!     let runtime = ArchivalRuntime::builder()
//!         .persistence(persistence)
//!         .storage(storage)
//!         .build()?
//!         .start();
//!
//!     let job = runtime.jobs().request_archive("Product", None).await?;
//!     println!("archiving under job {}", job.job_id);
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::jobs::{JobService, ModelRegistry};
use crate::persistence::Persistence;
use crate::pipeline::{PipelineConfig, PipelineWorker};
use crate::storage::ColdStorage;

/// Builder for creating an [`ArchivalRuntime`].
pub struct ArchivalRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    storage: Option<Arc<dyn ColdStorage>>,
    registry: ModelRegistry,
    pipeline: PipelineConfig,
}

impl std::fmt::Debug for ArchivalRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalRuntimeBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("storage", &self.storage.as_ref().map(|_| "..."))
            .field("registry", &self.registry)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl Default for ArchivalRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            storage: None,
            registry: ModelRegistry::with_defaults(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ArchivalRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the cold storage backend (required).
    pub fn storage(mut self, storage: Arc<dyn ColdStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replace the archivable-model registry.
    ///
    /// Default: the registry with the bundled `Product` model.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the pipeline tuning knobs.
    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ArchivalRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        let storage = self
            .storage
            .ok_or_else(|| anyhow::anyhow!("storage is required"))?;

        Ok(ArchivalRuntimeConfig {
            persistence,
            storage,
            registry: self.registry,
            pipeline: self.pipeline,
        })
    }
}

/// Configuration for an [`ArchivalRuntime`].
pub struct ArchivalRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    storage: Arc<dyn ColdStorage>,
    registry: ModelRegistry,
    pipeline: PipelineConfig,
}

impl std::fmt::Debug for ArchivalRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalRuntimeConfig")
            .field("persistence", &"...")
            .field("storage", &"...")
            .field("registry", &self.registry)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl ArchivalRuntimeConfig {
    /// Start the runtime, spawning the pipeline worker task.
    pub fn start(self) -> ArchivalRuntime {
        let jobs = Arc::new(JobService::new(self.persistence.clone(), self.registry));
        let worker = PipelineWorker::new(
            self.persistence.clone(),
            self.storage.clone(),
            self.pipeline,
        );
        let shutdown = worker.shutdown_handle();
        let worker_handle = tokio::spawn(async move { worker.run().await });

        info!("ArchivalRuntime started");

        ArchivalRuntime {
            worker_handle,
            shutdown,
            jobs,
            persistence: self.persistence,
            storage: self.storage,
        }
    }
}

/// A running archival engine that can be embedded in an application.
///
/// The runtime manages the background pipeline worker that executes
/// archive and restore jobs. Call [`shutdown`](Self::shutdown) for
/// graceful termination.
pub struct ArchivalRuntime {
    worker_handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
    jobs: Arc<JobService>,
    persistence: Arc<dyn Persistence>,
    storage: Arc<dyn ColdStorage>,
}

impl ArchivalRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ArchivalRuntimeBuilder {
        ArchivalRuntimeBuilder::new()
    }

    /// Get the job service for creating and querying jobs.
    pub fn jobs(&self) -> &Arc<JobService> {
        &self.jobs
    }

    /// Get a reference to the persistence layer.
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Get a reference to the cold storage backend.
    pub fn storage(&self) -> &Arc<dyn ColdStorage> {
        &self.storage
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the pipeline worker to stop after its current job and
    /// waits for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        info!("ArchivalRuntime shutting down...");
        self.shutdown.notify_one();
        self.worker_handle.await?;
        info!("ArchivalRuntime shutdown complete");
        Ok(())
    }
}
