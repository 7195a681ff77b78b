// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background pipeline that executes archive and restore jobs.
//!
//! The worker polls the job table, claims the oldest queued job and runs
//! it to a terminal state. Export moves claimed live records into cold
//! storage one at a time; import brings archived records back. Each
//! record moves inside a single database transaction, so a crash between
//! records leaves every record either fully live or fully archived,
//! never both.
//!
//! Storage operations that fail transiently are retried with doubling
//! backoff before the job is failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use crate::condition::{build_condition_for_fetch, build_condition_for_insert};
use crate::error::Result;
use crate::persistence::{JobDirection, JobRecord, JobStatus, Persistence};
use crate::storage::ColdStorage;

/// Pipeline worker tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long to sleep between polls of the job table.
    pub poll_interval: Duration,
    /// How many times a transient storage failure is attempted in total.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles per further attempt.
    pub retry_base_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from environment variables, falling
    /// back to defaults:
    /// - `COLDLINE_PIPELINE_POLL_INTERVAL_MS` (default: 500)
    /// - `COLDLINE_PIPELINE_MAX_ATTEMPTS` (default: 3)
    /// - `COLDLINE_PIPELINE_RETRY_BASE_MS` (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: std::env::var("COLDLINE_PIPELINE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_attempts: std::env::var("COLDLINE_PIPELINE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            retry_base_delay: std::env::var("COLDLINE_PIPELINE_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
        }
    }
}

/// Worker that drains the job queue.
pub struct PipelineWorker {
    persistence: Arc<dyn Persistence>,
    storage: Arc<dyn ColdStorage>,
    config: PipelineConfig,
    shutdown: Arc<Notify>,
}

impl PipelineWorker {
    /// Create a pipeline worker.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        storage: Arc<dyn ColdStorage>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            persistence,
            storage,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle that stops [`Self::run`] when notified.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Poll-and-execute loop. Returns after a shutdown notification.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "pipeline worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("pipeline worker shutting down");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "pipeline pass failed");
                    }
                }
            }
        }
    }

    /// Drain every currently queued job and return how many were executed.
    ///
    /// Jobs that fail are recorded as failed, not returned as errors;
    /// only claiming itself can fail here.
    pub async fn run_once(&self) -> Result<usize> {
        let mut executed = 0;
        while let Some(job) = self.persistence.claim_next_queued_job(Utc::now()).await? {
            self.execute_job(job).await;
            executed += 1;
        }
        Ok(executed)
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, direction = %job.direction))]
    async fn execute_job(&self, job: JobRecord) {
        let result = match job.job_direction() {
            Ok(JobDirection::Export) => self.run_export(&job).await,
            Ok(JobDirection::Import) => self.run_import(&job).await,
            Err(e) => Err(e),
        };

        let (status, error) = match &result {
            Ok(moved) => {
                info!(records = moved, "job succeeded");
                (JobStatus::Succeeded, None)
            }
            Err(e) => {
                error!(error = %e, "job failed");
                (JobStatus::Failed, Some(e.to_string()))
            }
        };

        match self
            .persistence
            .finish_job(&job.job_id, status, error.as_deref(), Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("job already terminal, terminal status not overwritten"),
            Err(e) => error!(error = %e, "failed to record terminal job status"),
        }
    }

    /// Archive every matching live record. Returns how many records moved.
    async fn run_export(&self, job: &JobRecord) -> Result<usize> {
        let selection = job.selection_filter()?;
        let condition =
            build_condition_for_insert(selection.as_ref().and_then(|f| f.where_clause()));
        let records = self
            .persistence
            .find_archivable_records(&job.model_name, &condition)
            .await?;
        debug!(candidates = records.len(), "export selection resolved");

        let mut moved = 0;
        for record in records {
            if !self
                .persistence
                .claim_record(&job.model_name, &record.record_id, &job.job_id)
                .await?
            {
                debug!(record_id = %record.record_id, "record claimed elsewhere, skipping");
                continue;
            }

            match self.export_one(job, &record.record_id, &record.payload).await {
                Ok(true) => moved += 1,
                Ok(false) => {
                    debug!(record_id = %record.record_id, "record vanished before archiving");
                }
                Err(e) => {
                    // Leave already-archived records archived; undo only
                    // the in-flight record so it stays fully live.
                    self.undo_partial_export(job, &record.record_id).await;
                    return Err(e);
                }
            }
        }
        Ok(moved)
    }

    async fn export_one(
        &self,
        job: &JobRecord,
        record_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool> {
        let location = self
            .with_retry("export blob", || {
                self.storage.export_data(&job.model_name, record_id, payload)
            })
            .await?;

        let archived = self
            .with_retry("archive record", || {
                self.persistence.archive_record(
                    &job.model_name,
                    record_id,
                    &job.job_id,
                    &location,
                    Utc::now(),
                )
            })
            .await;

        match archived {
            Ok(true) => Ok(true),
            Ok(false) => {
                // The live row disappeared under our claim; drop the
                // now-orphaned blob.
                if let Err(e) = self.storage.delete(&location).await {
                    warn!(location, error = %e, "failed to delete orphaned blob");
                }
                Ok(false)
            }
            Err(e) => {
                if let Err(del) = self.storage.delete(&location).await {
                    warn!(location, error = %del, "failed to delete blob of failed archive");
                }
                Err(e)
            }
        }
    }

    async fn undo_partial_export(&self, job: &JobRecord, record_id: &str) {
        match self
            .persistence
            .release_claims(&job.model_name, &job.job_id)
            .await
        {
            Ok(released) if released > 0 => {
                debug!(record_id, released, "released claims of failed export");
            }
            Ok(_) => {}
            Err(e) => error!(record_id, error = %e, "failed to release claims"),
        }
    }

    /// Restore every archived record of the job's model. Returns how many
    /// records moved.
    async fn run_import(&self, job: &JobRecord) -> Result<usize> {
        let selection = job.selection_filter()?;
        let condition = build_condition_for_fetch(selection.as_ref(), &job.model_name);
        let mappings = self.persistence.list_mappings(&condition).await?;
        debug!(candidates = mappings.len(), "import selection resolved");

        let mut moved = 0;
        for mapping in mappings {
            let payload = self
                .with_retry("import blob", || self.storage.import_data(&mapping.location))
                .await?;

            let restored = self
                .with_retry("restore record", || {
                    self.persistence
                        .restore_record(&job.model_name, &payload, mapping.id)
                })
                .await?;

            if restored {
                moved += 1;
            } else {
                debug!(record_id = %mapping.record_id, "record already live, mapping dropped");
            }

            // The mapping is gone, so the blob is unreachable; removal is
            // best effort.
            if let Err(e) = self.storage.delete(&mapping.location).await {
                warn!(location = %mapping.location, error = %e, "failed to delete restored blob");
            }
        }
        Ok(moved)
    }

    /// Run an operation, retrying transient failures with doubling backoff.
    async fn with_retry<T, Fut>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(100));
    }
}
