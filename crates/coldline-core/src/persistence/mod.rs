// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for coldline-core.
//!
//! Defines the persistence abstraction over the live store (products),
//! the archive-mapping table and the job table, with PostgreSQL and
//! SQLite implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::filter::{Filter, WhereClause};

/// Logical model name of the product entity.
pub const PRODUCT_MODEL: &str = "Product";

/// Live product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductRecord {
    /// Unique identifier (uuid).
    pub id: String,
    /// Product name.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
    /// When the record was created.
    pub created_on: DateTime<Utc>,
    /// When the record was last modified.
    pub modified_on: DateTime<Utc>,
}

/// Archive-mapping row: one archived record and where its blob lives.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArchiveMappingRecord {
    /// Database primary key.
    pub id: i64,
    /// Logical model name the mapping belongs to.
    pub acted_on: String,
    /// Original record identifier.
    pub record_id: String,
    /// Cold storage location of the serialized record.
    pub location: String,
    /// When the record was archived.
    pub archived_at: DateTime<Utc>,
}

/// Job row for one asynchronous archive or restore operation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRecord {
    /// Opaque unique job id.
    pub job_id: String,
    /// Logical model the job acts on.
    pub model_name: String,
    /// Direction (`export` or `import`).
    pub direction: String,
    /// Current status (`pending`, `running`, `succeeded`, `failed`).
    pub status: String,
    /// JSON-encoded selection filter, if any.
    pub selection: Option<String>,
    /// Failure reason once the job is failed.
    pub error: Option<String>,
    /// When the job row was created.
    pub created_at: DateTime<Utc>,
    /// When the job was released to the pipeline; `NULL` for import jobs
    /// that have not been triggered yet.
    pub queued_at: Option<DateTime<Utc>>,
    /// When the pipeline picked the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Parse the stored status string.
    pub fn job_status(&self) -> Result<JobStatus> {
        JobStatus::parse(&self.status)
    }

    /// Parse the stored direction string.
    pub fn job_direction(&self) -> Result<JobDirection> {
        JobDirection::parse(&self.direction)
    }

    /// Decode the stored selection filter.
    pub fn selection_filter(&self) -> Result<Option<Filter>> {
        match &self.selection {
            Some(text) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }
}

/// Status of an archive/restore job.
///
/// Transitions are monotonic: `pending → running → succeeded | failed`,
/// and a terminal status never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for the pipeline.
    Pending,
    /// Picked up by the pipeline worker.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a recorded failure.
    Failed,
}

impl JobStatus {
    /// The status as its stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::ValidationError {
                field: "status".to_string(),
                message: format!("unknown job status '{}'", other),
            }),
        }
    }

    /// Whether this status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Direction of an archive/restore job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobDirection {
    /// Move live records to cold storage.
    Export,
    /// Restore archived records to the live store.
    Import,
}

impl JobDirection {
    /// The direction as its stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Import => "import",
        }
    }

    /// Parse a stored direction string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "export" => Ok(Self::Export),
            "import" => Ok(Self::Import),
            other => Err(CoreError::ValidationError {
                field: "direction".to_string(),
                message: format!("unknown job direction '{}'", other),
            }),
        }
    }
}

/// A live record selected for archival, serialized for cold storage.
#[derive(Debug, Clone)]
pub struct ArchivableRecord {
    /// The record's identifier in the live store.
    pub record_id: String,
    /// The full record as JSON, as it will be written to cold storage.
    pub payload: Value,
}

/// A JSON predicate value converted to something SQL can bind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    /// Text column value.
    Text(String),
    /// Integer column value.
    Int(i64),
    /// SQL NULL.
    Null,
}

/// Columns of `products` that filters may reference.
const PRODUCT_FILTER_COLUMNS: &[&str] = &["id", "name", "description", "price"];

/// Columns of `products` that patches may set.
const PRODUCT_PATCH_COLUMNS: &[&str] = &["name", "description", "price"];

fn to_bind_value(column: &str, value: &Value) -> Result<BindValue> {
    match value {
        Value::String(s) => Ok(BindValue::Text(s.clone())),
        Value::Number(n) => n.as_i64().map(BindValue::Int).ok_or_else(|| {
            CoreError::ValidationError {
                field: column.to_string(),
                message: "only integer numbers are supported".to_string(),
            }
        }),
        Value::Null => Ok(BindValue::Null),
        _ => Err(CoreError::ValidationError {
            field: column.to_string(),
            message: "predicate values must be strings, integers or null".to_string(),
        }),
    }
}

fn clause_binds(
    clause: &WhereClause,
    allowed: &'static [&'static str],
) -> Result<Vec<(&'static str, BindValue)>> {
    let mut binds = Vec::with_capacity(clause.len());
    for (field, value) in clause {
        let column = allowed
            .iter()
            .find(|c| **c == field.as_str())
            .ok_or_else(|| CoreError::ValidationError {
                field: field.clone(),
                message: "unknown product field".to_string(),
            })?;
        binds.push((*column, to_bind_value(column, value)?));
    }
    Ok(binds)
}

/// Validate a product where clause and convert it to bindable values.
pub(crate) fn product_where_binds(
    clause: &WhereClause,
) -> Result<Vec<(&'static str, BindValue)>> {
    clause_binds(clause, PRODUCT_FILTER_COLUMNS)
}

/// Validate a product patch and convert it to bindable values.
///
/// Empty patches are a caller error: there is nothing to set.
pub(crate) fn product_patch_binds(
    patch: &WhereClause,
) -> Result<Vec<(&'static str, BindValue)>> {
    if patch.is_empty() {
        return Err(CoreError::ValidationError {
            field: "patch".to_string(),
            message: "patch must set at least one field".to_string(),
        });
    }
    clause_binds(patch, PRODUCT_PATCH_COLUMNS)
}

/// Reject negative pagination values before they reach a bind.
///
/// SQLite shrugs at a negative LIMIT but PostgreSQL rejects it at
/// execution time, so both backends validate up front.
pub(crate) fn validate_pagination(filter: &Filter) -> Result<()> {
    if filter.limit.is_some_and(|limit| limit < 0) {
        return Err(CoreError::ValidationError {
            field: "limit".to_string(),
            message: "limit must not be negative".to_string(),
        });
    }
    if filter.offset.is_some_and(|offset| offset < 0) {
        return Err(CoreError::ValidationError {
            field: "offset".to_string(),
            message: "offset must not be negative".to_string(),
        });
    }
    Ok(())
}

/// Reject model names that are not registered as archivable.
///
/// The live store currently backs a single archivable model; archival
/// operations for anything else fail before touching a table.
pub(crate) fn require_known_model(model: &str) -> Result<()> {
    if model == PRODUCT_MODEL {
        Ok(())
    } else {
        Err(CoreError::ModelNotFound {
            model: model.to_string(),
        })
    }
}

/// Extract the `acted_on` model scope from a mapping fetch condition.
///
/// Fetch conditions are produced by the condition builder and always
/// carry exactly one `acted_on` predicate; anything else is a caller
/// contract violation.
pub(crate) fn mapping_scope(filter: &Filter) -> Result<String> {
    let clause = filter
        .where_clause()
        .ok_or_else(|| CoreError::ValidationError {
            field: "where".to_string(),
            message: "mapping filter requires an acted_on predicate".to_string(),
        })?;
    match clause.get(crate::condition::ACTED_ON) {
        Some(Value::String(model)) => Ok(model.clone()),
        _ => Err(CoreError::ValidationError {
            field: crate::condition::ACTED_ON.to_string(),
            message: "mapping filter requires a string acted_on predicate".to_string(),
        }),
    }
}

/// Persistence interface used by the job service, pipeline and HTTP layer.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ------------------------------------------------------------------
    // Live store CRUD (products)
    // ------------------------------------------------------------------

    /// Insert a new product.
    async fn create_product(&self, product: &ProductRecord) -> Result<()>;

    /// Fetch a product by id.
    async fn get_product(&self, id: &str) -> Result<Option<ProductRecord>>;

    /// List products matching a filter.
    async fn list_products(&self, filter: &Filter) -> Result<Vec<ProductRecord>>;

    /// Count products matching a where clause.
    async fn count_products(&self, where_clause: Option<&WhereClause>) -> Result<i64>;

    /// Partially update a product by id. Returns false when the id is unknown.
    async fn update_product(&self, id: &str, patch: &WhereClause) -> Result<bool>;

    /// Replace a product wholesale. Returns false when the id is unknown.
    async fn replace_product(&self, product: &ProductRecord) -> Result<bool>;

    /// Partially update every product matching a where clause.
    /// Returns the number of updated rows.
    async fn update_products_where(
        &self,
        patch: &WhereClause,
        where_clause: Option<&WhereClause>,
    ) -> Result<u64>;

    /// Delete a product by id. Returns false when the id is unknown.
    async fn delete_product(&self, id: &str) -> Result<bool>;

    // ------------------------------------------------------------------
    // Archival selection, claims and record movement
    // ------------------------------------------------------------------

    /// Find unclaimed live records of a model matching a selection
    /// condition, serialized for export.
    async fn find_archivable_records(
        &self,
        model: &str,
        condition: &WhereClause,
    ) -> Result<Vec<ArchivableRecord>>;

    /// Atomically claim one record for an export job. Returns false when
    /// the record is already claimed by another job or no longer live.
    async fn claim_record(&self, model: &str, record_id: &str, job_id: &str) -> Result<bool>;

    /// Release every claim held by a job. Returns the number of released
    /// records.
    async fn release_claims(&self, model: &str, job_id: &str) -> Result<u64>;

    /// Finish archiving one record: in a single transaction, write the
    /// archive mapping and remove the live row (which must still be
    /// claimed by `job_id`). Returns false if the row was gone.
    async fn archive_record(
        &self,
        model: &str,
        record_id: &str,
        job_id: &str,
        location: &str,
        archived_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Finish restoring one record: in a single transaction, reinsert the
    /// live row (insert-or-ignore, so a double restore cannot duplicate
    /// records) and delete the mapping. Returns false when the record was
    /// already live.
    async fn restore_record(
        &self,
        model: &str,
        payload: &Value,
        mapping_id: i64,
    ) -> Result<bool>;

    /// List archive mappings matching a fetch condition built by
    /// [`crate::condition::build_condition_for_fetch`].
    async fn list_mappings(&self, condition: &Filter) -> Result<Vec<ArchiveMappingRecord>>;

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Insert a new job row.
    async fn insert_job(&self, job: &JobRecord) -> Result<()>;

    /// Fetch a job by id.
    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>>;

    /// Release a job to the pipeline. Returns false when the job was
    /// already queued (idempotent trigger).
    async fn queue_job(&self, job_id: &str, queued_at: DateTime<Utc>) -> Result<bool>;

    /// Atomically claim the oldest queued pending job and mark it
    /// running. Returns `None` when nothing is queued.
    async fn claim_next_queued_job(
        &self,
        started_at: DateTime<Utc>,
    ) -> Result<Option<JobRecord>>;

    /// Record a terminal status for a job. The update is guarded so a
    /// terminal status never reverts; returns false when the job was
    /// already terminal.
    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool>;

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Verify database connectivity.
    async fn health_check_db(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_product_where_binds_accepts_known_columns() {
        let mut clause = WhereClause::new();
        clause.insert("name".to_string(), json!("soap"));
        clause.insert("price".to_string(), json!(499));

        let binds = product_where_binds(&clause).unwrap();
        assert_eq!(binds.len(), 2);
        assert!(binds.contains(&("name", BindValue::Text("soap".to_string()))));
        assert!(binds.contains(&("price", BindValue::Int(499))));
    }

    #[test]
    fn test_product_where_binds_rejects_unknown_column() {
        let mut clause = WhereClause::new();
        clause.insert("vendor".to_string(), json!("acme"));

        let err = product_where_binds(&clause).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_product_where_binds_rejects_nested_values() {
        let mut clause = WhereClause::new();
        clause.insert("name".to_string(), json!({"like": "soap%"}));

        let err = product_where_binds(&clause).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_patch_binds_reject_id_and_empty() {
        let mut patch = WhereClause::new();
        patch.insert("id".to_string(), json!("x"));
        assert!(product_patch_binds(&patch).is_err());

        let empty = WhereClause::new();
        assert!(product_patch_binds(&empty).is_err());
    }

    #[test]
    fn test_mapping_scope_reads_acted_on() {
        let condition = crate::condition::build_condition_for_fetch(None, "Product");
        assert_eq!(mapping_scope(&condition).unwrap(), "Product");

        let empty = Filter::default();
        assert!(mapping_scope(&empty).is_err());
    }

    #[test]
    fn test_job_status_roundtrip_and_terminality() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::parse("cancelled").is_err());
    }

    #[test]
    fn test_job_direction_parse() {
        assert_eq!(JobDirection::parse("export").unwrap(), JobDirection::Export);
        assert_eq!(JobDirection::parse("import").unwrap(), JobDirection::Import);
        assert!(JobDirection::parse("sideways").is_err());
    }

    #[test]
    fn test_job_record_selection_filter() {
        let job = JobRecord {
            job_id: "j-1".to_string(),
            model_name: PRODUCT_MODEL.to_string(),
            direction: "export".to_string(),
            status: "pending".to_string(),
            selection: Some(r#"{"where":{"name":"soap"}}"#.to_string()),
            error: None,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            finished_at: None,
        };
        let filter = job.selection_filter().unwrap().unwrap();
        assert_eq!(filter.where_clause().unwrap().get("name"), Some(&json!("soap")));
    }
}
