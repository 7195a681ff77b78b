// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive job requestor, import trigger and status queries.
//!
//! Requests return a job descriptor immediately; the actual data
//! movement happens in the pipeline worker. An export job is queued the
//! moment it is created. A retrieval job is created unqueued and only
//! released to the pipeline when the import trigger fires with its id,
//! which keeps the trigger idempotent: queueing is a one-shot
//! `queued_at` update.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::filter::Filter;
use crate::persistence::{
    JobDirection, JobRecord, JobStatus, PRODUCT_MODEL, Persistence,
};

/// Registry of logical models that may be archived.
///
/// Replaces the framework's implicit dependency-injection container with
/// an explicit registry handed to the job service at startup.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<String>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the models this repository ships: `Product`.
    pub fn with_defaults() -> Self {
        Self::new().register(PRODUCT_MODEL)
    }

    /// Register a model as archivable.
    pub fn register(mut self, model: impl Into<String>) -> Self {
        self.models.push(model.into());
        self
    }

    /// Whether a model is archivable.
    pub fn contains(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Job descriptor handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    /// Opaque unique job id, usable immediately for status queries and
    /// import triggers.
    pub job_id: String,
    /// Current job status.
    pub status: JobStatus,
}

impl JobResponse {
    fn from_record(record: &JobRecord) -> Result<Self> {
        Ok(Self {
            job_id: record.job_id.clone(),
            status: record.job_status()?,
        })
    }
}

/// Entry point for creating and querying archive/restore jobs.
pub struct JobService {
    persistence: Arc<dyn Persistence>,
    registry: ModelRegistry,
}

impl JobService {
    /// Create a job service over a persistence backend and model registry.
    pub fn new(persistence: Arc<dyn Persistence>, registry: ModelRegistry) -> Self {
        Self {
            persistence,
            registry,
        }
    }

    fn require_archivable(&self, model: &str) -> Result<()> {
        if self.registry.contains(model) {
            Ok(())
        } else {
            Err(CoreError::ModelNotFound {
                model: model.to_string(),
            })
        }
    }

    fn new_job(
        &self,
        model: &str,
        filter: Option<&Filter>,
        direction: JobDirection,
        queued: bool,
    ) -> Result<JobRecord> {
        let now = Utc::now();
        let selection = filter.map(serde_json::to_string).transpose()?;
        Ok(JobRecord {
            job_id: Uuid::new_v4().to_string(),
            model_name: model.to_string(),
            direction: direction.as_str().to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            selection,
            error: None,
            created_at: now,
            queued_at: queued.then_some(now),
            started_at: None,
            finished_at: None,
        })
    }

    /// Create an export job archiving records of `model` that match
    /// `filter`.
    ///
    /// Fails with `ModelNotFound` before any job row is written when the
    /// model is not archivable. The job is queued immediately; the
    /// descriptor is returned without waiting for the pipeline.
    #[instrument(skip(self, filter))]
    pub async fn request_archive(
        &self,
        model: &str,
        filter: Option<Filter>,
    ) -> Result<JobResponse> {
        self.require_archivable(model)?;

        let job = self.new_job(model, filter.as_ref(), JobDirection::Export, true)?;
        self.persistence.insert_job(&job).await?;

        info!(job_id = %job.job_id, model, "export job created");
        JobResponse::from_record(&job)
    }

    /// Create a retrieval job for previously archived records of `model`.
    ///
    /// The job is created unqueued: it describes which archived data the
    /// caller wants back, and runs only once [`Self::trigger_import`] is
    /// called with its id.
    #[instrument(skip(self, filter))]
    pub async fn request_retrieval(
        &self,
        model: &str,
        filter: Option<Filter>,
    ) -> Result<JobResponse> {
        self.require_archivable(model)?;

        let job = self.new_job(model, filter.as_ref(), JobDirection::Import, false)?;
        self.persistence.insert_job(&job).await?;

        info!(job_id = %job.job_id, model, "retrieval job created");
        JobResponse::from_record(&job)
    }

    /// Release the restore under `job_id` to the pipeline and return
    /// immediately.
    ///
    /// Unknown ids fail with `JobNotFound` and mutate nothing. Calling
    /// again for a job that is already queued, running or terminal is a
    /// no-op that returns the job's current descriptor, so a double
    /// trigger can never produce a second independent restore execution.
    #[instrument(skip(self))]
    pub async fn trigger_import(&self, job_id: &str) -> Result<JobResponse> {
        let job = self
            .persistence
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        let queued_now = self.persistence.queue_job(&job.job_id, Utc::now()).await?;
        if queued_now {
            info!(job_id = %job.job_id, "import queued");
        } else {
            debug!(job_id = %job.job_id, status = %job.status, "import already queued, no-op");
        }

        // Re-read so the descriptor reflects any state the pipeline
        // reached in the meantime.
        let current = self
            .persistence
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        JobResponse::from_record(&current)
    }

    /// Query a job's current descriptor by id.
    pub async fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        self.persistence
            .get_job(job_id)
            .await?
            .ok_or_else(|| CoreError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::WhereClause;
    use crate::persistence::SqlitePersistence;
    use serde_json::json;

    async fn service() -> (JobService, Arc<SqlitePersistence>) {
        let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
        let service = JobService::new(persistence.clone(), ModelRegistry::with_defaults());
        (service, persistence)
    }

    async fn job_count(persistence: &SqlitePersistence) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM archive_jobs")
            .fetch_one(persistence.pool())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_request_archive_returns_pending_descriptor() {
        let (service, persistence) = service().await;

        let response = service.request_archive(PRODUCT_MODEL, None).await.unwrap();
        assert_eq!(response.status, JobStatus::Pending);
        assert!(!response.job_id.is_empty());

        let job = persistence.get_job(&response.job_id).await.unwrap().unwrap();
        assert_eq!(job.job_direction().unwrap(), JobDirection::Export);
        assert!(job.queued_at.is_some(), "export jobs queue at creation");
    }

    #[tokio::test]
    async fn test_request_archive_unknown_model_leaves_no_job() {
        let (service, persistence) = service().await;

        let err = service.request_archive("Invoice", None).await.unwrap_err();
        assert_eq!(err.error_code(), "MODEL_NOT_FOUND");
        assert_eq!(job_count(&persistence).await, 0);
    }

    #[tokio::test]
    async fn test_retrieval_job_is_unqueued_until_triggered() {
        let (service, persistence) = service().await;

        let mut clause = WhereClause::new();
        clause.insert("name".to_string(), json!("soap"));
        let response = service
            .request_retrieval(PRODUCT_MODEL, Some(Filter::with_where(clause)))
            .await
            .unwrap();
        assert_eq!(response.status, JobStatus::Pending);

        let job = persistence.get_job(&response.job_id).await.unwrap().unwrap();
        assert_eq!(job.job_direction().unwrap(), JobDirection::Import);
        assert!(job.queued_at.is_none());

        let triggered = service.trigger_import(&response.job_id).await.unwrap();
        assert_eq!(triggered.job_id, response.job_id);

        let job = persistence.get_job(&response.job_id).await.unwrap().unwrap();
        assert!(job.queued_at.is_some());
    }

    #[tokio::test]
    async fn test_trigger_import_unknown_job_mutates_nothing() {
        let (service, persistence) = service().await;
        service.request_archive(PRODUCT_MODEL, None).await.unwrap();

        let err = service.trigger_import("no-such-job").await.unwrap_err();
        assert_eq!(err.error_code(), "JOB_NOT_FOUND");
        assert_eq!(job_count(&persistence).await, 1);
    }

    #[tokio::test]
    async fn test_trigger_import_is_idempotent() {
        let (service, persistence) = service().await;

        let response = service.request_retrieval(PRODUCT_MODEL, None).await.unwrap();
        let first = service.trigger_import(&response.job_id).await.unwrap();
        let second = service.trigger_import(&response.job_id).await.unwrap();
        assert_eq!(first.job_id, second.job_id);

        // Still a single job row; the second trigger queued nothing new.
        assert_eq!(job_count(&persistence).await, 1);
    }

    #[tokio::test]
    async fn test_get_job_not_found() {
        let (service, _persistence) = service().await;
        let err = service.get_job("missing").await.unwrap_err();
        assert_eq!(err.error_code(), "JOB_NOT_FOUND");
    }

    #[test]
    fn test_registry_contains() {
        let registry = ModelRegistry::with_defaults();
        assert!(registry.contains(PRODUCT_MODEL));
        assert!(!registry.contains("Invoice"));

        let registry = ModelRegistry::new().register("Invoice");
        assert!(registry.contains("Invoice"));
        assert!(!registry.contains(PRODUCT_MODEL));
    }
}
