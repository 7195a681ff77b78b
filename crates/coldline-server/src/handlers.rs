// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP request handlers.
//!
//! Handlers are thin pass-throughs to coldline-core operations: they
//! decode LoopBack-style query parameters (`filter` and `where` as JSON
//! strings), call the engine and map results to JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use coldline_core::error::CoreError;
use coldline_core::filter::{Filter, WhereClause};
use coldline_core::jobs::JobResponse;
use coldline_core::persistence::{PRODUCT_MODEL, ProductRecord};

use crate::AppState;
use crate::error::ApiError;

/// Body of POST `/products`.
#[derive(Debug, Deserialize)]
pub struct NewProduct {
    /// Product name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
}

/// Body of PUT `/products/{id}`.
#[derive(Debug, Deserialize)]
pub struct ReplaceProduct {
    /// Product name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
}

/// `?filter={"where":{...},"limit":..,"offset":..}`
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    filter: Option<String>,
}

impl FilterQuery {
    fn parse(&self) -> Result<Option<Filter>, ApiError> {
        self.filter
            .as_deref()
            .map(|text| {
                serde_json::from_str(text).map_err(|e| {
                    ApiError::Core(CoreError::ValidationError {
                        field: "filter".to_string(),
                        message: format!("invalid filter JSON: {}", e),
                    })
                })
            })
            .transpose()
    }
}

/// `?where={"field":value,...}`
#[derive(Debug, Default, Deserialize)]
pub struct WhereQuery {
    #[serde(rename = "where")]
    where_clause: Option<String>,
}

impl WhereQuery {
    fn parse(&self) -> Result<Option<WhereClause>, ApiError> {
        self.where_clause
            .as_deref()
            .map(|text| {
                serde_json::from_str(text).map_err(|e| {
                    ApiError::Core(CoreError::ValidationError {
                        field: "where".to_string(),
                        message: format!("invalid where JSON: {}", e),
                    })
                })
            })
            .transpose()
    }
}

/// Job details returned by GET `/jobs/{id}`.
#[derive(Debug, Serialize)]
pub struct JobDetails {
    /// Opaque unique job id.
    pub job_id: String,
    /// Logical model the job acts on.
    pub model_name: String,
    /// `export` or `import`.
    pub direction: String,
    /// Current status.
    pub status: String,
    /// Failure reason when the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the job row was created.
    pub created_at: DateTime<Utc>,
    /// When the pipeline picked the job up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// POST `/products`: create a product with a generated id.
#[instrument(skip(state, body))]
pub async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<NewProduct>,
) -> Result<Json<ProductRecord>, ApiError> {
    let now = Utc::now();
    let product = ProductRecord {
        id: Uuid::new_v4().to_string(),
        name: body.name,
        description: body.description,
        price: body.price,
        created_on: now,
        modified_on: now,
    };
    state.persistence.create_product(&product).await?;
    Ok(Json(product))
}

/// GET `/products`: list products matching the optional filter.
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<ProductRecord>>, ApiError> {
    let filter = query.parse()?.unwrap_or_default();
    Ok(Json(state.persistence.list_products(&filter).await?))
}

/// GET `/products/count`: count products matching the optional where clause.
#[instrument(skip(state))]
pub async fn count_products(
    State(state): State<AppState>,
    Query(query): Query<WhereQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let clause = query.parse()?;
    let count = state.persistence.count_products(clause.as_ref()).await?;
    Ok(Json(json!({ "count": count })))
}

/// PATCH `/products`: bulk update matching products, returns the count.
#[instrument(skip(state, patch))]
pub async fn update_products(
    State(state): State<AppState>,
    Query(query): Query<WhereQuery>,
    Json(patch): Json<WhereClause>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let clause = query.parse()?;
    let count = state
        .persistence
        .update_products_where(&patch, clause.as_ref())
        .await?;
    Ok(Json(json!({ "count": count })))
}

/// GET `/products/{id}`: fetch a product by id.
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductRecord>, ApiError> {
    state
        .persistence
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or_else(|| record_not_found(&id))
}

/// PATCH `/products/{id}`: partially update a product.
#[instrument(skip(state, patch))]
pub async fn patch_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<WhereClause>,
) -> Result<StatusCode, ApiError> {
    if state.persistence.update_product(&id, &patch).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(record_not_found(&id))
    }
}

/// PUT `/products/{id}`: replace a product's business fields.
#[instrument(skip(state, body))]
pub async fn replace_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ReplaceProduct>,
) -> Result<StatusCode, ApiError> {
    let now = Utc::now();
    let product = ProductRecord {
        id,
        name: body.name,
        description: body.description,
        price: body.price,
        // created_on is immutable; replace only touches business fields
        // and modified_on.
        created_on: now,
        modified_on: now,
    };
    if state.persistence.replace_product(&product).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(record_not_found(&product.id))
    }
}

/// DELETE `/products/{id}`: delete a product.
#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.persistence.delete_product(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(record_not_found(&id))
    }
}

/// DELETE `/products/archive`: archive matching records via an export job.
#[instrument(skip(state))]
pub async fn archive_products(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<JobResponse>, ApiError> {
    let filter = query.parse()?;
    let response = state.jobs.request_archive(PRODUCT_MODEL, filter).await?;
    Ok(Json(response))
}

/// GET `/products/archive`: create a retrieval job, fire the import
/// trigger without waiting for it and return the job descriptor.
#[instrument(skip(state))]
pub async fn get_archived_products(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<JobResponse>, ApiError> {
    let filter = query.parse()?;
    let response = state.jobs.request_retrieval(PRODUCT_MODEL, filter).await?;

    let jobs = state.jobs.clone();
    let job_id = response.job_id.clone();
    tokio::spawn(async move {
        if let Err(e) = jobs.trigger_import(&job_id).await {
            warn!(job_id = %job_id, error = %e, "import trigger failed");
        }
    });

    Ok(Json(response))
}

/// GET `/jobs/{id}`: query a job's status and timestamps.
#[instrument(skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDetails>, ApiError> {
    let job = state.jobs.get_job(&id).await?;
    Ok(Json(JobDetails {
        job_id: job.job_id,
        model_name: job.model_name,
        direction: job.direction,
        status: job.status,
        error: job.error,
        created_at: job.created_at,
        started_at: job.started_at,
        finished_at: job.finished_at,
    }))
}

/// GET `/health`: liveness plus a database ping.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.persistence.health_check_db().await {
        Ok(true) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded" })),
        ),
    }
}

fn record_not_found(id: &str) -> ApiError {
    ApiError::Core(CoreError::RecordNotFound {
        model: PRODUCT_MODEL.to_string(),
        record_id: id.to_string(),
    })
}
