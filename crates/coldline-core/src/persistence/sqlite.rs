//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::{CoreError, Result};
use crate::filter::{Filter, WhereClause};

use super::{
    ArchivableRecord, ArchiveMappingRecord, BindValue, JobRecord, JobStatus, Persistence,
    ProductRecord, mapping_scope, product_patch_binds, product_where_binds, require_known_model,
    validate_pagination,
};

const PRODUCT_COLUMNS: &str = "id, name, description, price, created_on, modified_on";

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file if needed,
    /// connects with sensible defaults and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Create an in-memory SQLite persistence with migrations applied.
    ///
    /// The pool is limited to one connection so every query sees the same
    /// in-memory database. Intended for tests and demos.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to open in-memory SQLite: {}", e),
            })?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        crate::migrations::run_sqlite(pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Render a list of predicates as `col = ?` / `col IS NULL` fragments.
///
/// NULL predicates render as `IS NULL` and consume no bind slot.
fn predicate_parts(binds: &[(&'static str, BindValue)]) -> Vec<String> {
    binds
        .iter()
        .map(|(column, value)| match value {
            BindValue::Null => format!("{} IS NULL", column),
            _ => format!("{} = ?", column),
        })
        .collect()
}

fn bind_predicates<'q, O>(
    mut query: sqlx::query::QueryAs<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &[(&'static str, BindValue)],
) -> sqlx::query::QueryAs<'q, sqlx::Sqlite, O, sqlx::sqlite::SqliteArguments<'q>> {
    for (_, value) in binds {
        query = match value {
            BindValue::Text(s) => query.bind(s.clone()),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Null => query,
        };
    }
    query
}

fn bind_predicates_plain<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &[(&'static str, BindValue)],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for (_, value) in binds {
        query = match value {
            BindValue::Text(s) => query.bind(s.clone()),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Null => query,
        };
    }
    query
}

/// Bind patch values for SET fragments; NULL binds as a real NULL here.
fn bind_patch<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &[(&'static str, BindValue)],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for (_, value) in binds {
        query = match value {
            BindValue::Text(s) => query.bind(s.clone()),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn create_product(&self, product: &ProductRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, created_on, modified_on)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.created_on)
        .bind(product.modified_on)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<ProductRecord>> {
        let record = sqlx::query_as::<_, ProductRecord>(&format!(
            "SELECT {} FROM products WHERE id = ?",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_products(&self, filter: &Filter) -> Result<Vec<ProductRecord>> {
        validate_pagination(filter)?;
        let binds = match filter.where_clause() {
            Some(clause) => product_where_binds(clause)?,
            None => Vec::new(),
        };

        let mut sql = format!("SELECT {} FROM products", PRODUCT_COLUMNS);
        let parts = predicate_parts(&binds);
        if !parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }
        sql.push_str(" ORDER BY created_on, id");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            if filter.limit.is_none() {
                // SQLite requires LIMIT before OFFSET; -1 means unlimited.
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(" OFFSET ?");
        }

        let mut query = bind_predicates(sqlx::query_as::<_, ProductRecord>(&sql), &binds);
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn count_products(&self, where_clause: Option<&WhereClause>) -> Result<i64> {
        let binds = match where_clause {
            Some(clause) => product_where_binds(clause)?,
            None => Vec::new(),
        };

        let mut sql = "SELECT COUNT(*) FROM products".to_string();
        let parts = predicate_parts(&binds);
        if !parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        let count: i64 = bind_predicates(sqlx::query_as::<_, (i64,)>(&sql), &binds)
            .fetch_one(&self.pool)
            .await?
            .0;

        Ok(count)
    }

    async fn update_product(&self, id: &str, patch: &WhereClause) -> Result<bool> {
        let binds = product_patch_binds(patch)?;

        let sets: Vec<String> = binds
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect();
        let sql = format!(
            "UPDATE products SET {}, modified_on = ? WHERE id = ?",
            sets.join(", ")
        );

        let result = bind_patch(sqlx::query(&sql), &binds)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_product(&self, product: &ProductRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?, description = ?, price = ?, modified_on = ?
            WHERE id = ?
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.modified_on)
        .bind(&product.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_products_where(
        &self,
        patch: &WhereClause,
        where_clause: Option<&WhereClause>,
    ) -> Result<u64> {
        let patch_binds = product_patch_binds(patch)?;
        let where_binds = match where_clause {
            Some(clause) => product_where_binds(clause)?,
            None => Vec::new(),
        };

        let sets: Vec<String> = patch_binds
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect();
        let mut sql = format!("UPDATE products SET {}, modified_on = ?", sets.join(", "));
        let parts = predicate_parts(&where_binds);
        if !parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        let query = bind_patch(sqlx::query(&sql), &patch_binds).bind(Utc::now());
        let result = bind_predicates_plain(query, &where_binds)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_product(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_archivable_records(
        &self,
        model: &str,
        condition: &WhereClause,
    ) -> Result<Vec<ArchivableRecord>> {
        require_known_model(model)?;
        let binds = product_where_binds(condition)?;

        let mut parts = predicate_parts(&binds);
        parts.push("claimed_by IS NULL".to_string());
        let sql = format!(
            "SELECT {} FROM products WHERE {} ORDER BY id",
            PRODUCT_COLUMNS,
            parts.join(" AND ")
        );

        let rows = bind_predicates(sqlx::query_as::<_, ProductRecord>(&sql), &binds)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|record| {
                Ok(ArchivableRecord {
                    record_id: record.id.clone(),
                    payload: serde_json::to_value(&record)?,
                })
            })
            .collect()
    }

    async fn claim_record(&self, model: &str, record_id: &str, job_id: &str) -> Result<bool> {
        require_known_model(model)?;

        let result = sqlx::query(
            "UPDATE products SET claimed_by = ? WHERE id = ? AND claimed_by IS NULL",
        )
        .bind(job_id)
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_claims(&self, model: &str, job_id: &str) -> Result<u64> {
        require_known_model(model)?;

        let result = sqlx::query("UPDATE products SET claimed_by = NULL WHERE claimed_by = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn archive_record(
        &self,
        model: &str,
        record_id: &str,
        job_id: &str,
        location: &str,
        archived_at: DateTime<Utc>,
    ) -> Result<bool> {
        require_known_model(model)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO archive_mappings (acted_on, record_id, location, archived_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(model)
        .bind(record_id)
        .bind(location)
        .bind(archived_at)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM products WHERE id = ? AND claimed_by = ?")
            .bind(record_id)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn restore_record(
        &self,
        model: &str,
        payload: &serde_json::Value,
        mapping_id: i64,
    ) -> Result<bool> {
        require_known_model(model)?;

        let record: ProductRecord = serde_json::from_value(payload.clone())?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO products (id, name, description, price, created_on, modified_on)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.price)
        .bind(record.created_on)
        .bind(record.modified_on)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM archive_mappings WHERE id = ?")
            .bind(mapping_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted.rows_affected() > 0)
    }

    async fn list_mappings(&self, condition: &Filter) -> Result<Vec<ArchiveMappingRecord>> {
        let scope = mapping_scope(condition)?;

        let rows = sqlx::query_as::<_, ArchiveMappingRecord>(
            r#"
            SELECT id, acted_on, record_id, location, archived_at
            FROM archive_mappings
            WHERE acted_on = ?
            ORDER BY id
            "#,
        )
        .bind(scope)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert_job(&self, job: &JobRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO archive_jobs
                (job_id, model_name, direction, status, selection, error,
                 created_at, queued_at, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.model_name)
        .bind(&job.direction)
        .bind(&job.status)
        .bind(&job.selection)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.queued_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT job_id, model_name, direction, status, selection, error,
                   created_at, queued_at, started_at, finished_at
            FROM archive_jobs
            WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn queue_job(&self, job_id: &str, queued_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE archive_jobs SET queued_at = ? WHERE job_id = ? AND queued_at IS NULL",
        )
        .bind(queued_at)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_next_queued_job(
        &self,
        started_at: DateTime<Utc>,
    ) -> Result<Option<JobRecord>> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE archive_jobs
            SET status = 'running', started_at = ?
            WHERE job_id = (
                SELECT job_id FROM archive_jobs
                WHERE status = 'pending' AND queued_at IS NOT NULL
                ORDER BY queued_at
                LIMIT 1
            )
            RETURNING job_id, model_name, direction, status, selection, error,
                      created_at, queued_at, started_at, finished_at
            "#,
        )
        .bind(started_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE archive_jobs
            SET status = ?, error = ?, finished_at = ?
            WHERE job_id = ? AND status NOT IN ('succeeded', 'failed')
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(finished_at)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check_db(&self) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
