// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for coldline-core.
//!
//! Provides a unified error type with stable error codes that the HTTP
//! layer maps to response statuses.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing or pipeline runs.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// The logical model name is not registered as archivable.
    ModelNotFound {
        /// The model name that was not found.
        model: String,
    },

    /// The job id does not exist.
    JobNotFound {
        /// The job id that was not found.
        job_id: String,
    },

    /// A live record was not found.
    RecordNotFound {
        /// The model the record belongs to.
        model: String,
        /// The record id that was not found.
        record_id: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Retryable I/O failure against the live store or cold storage.
    TransientStoreError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Terminal, non-retryable failure of an export/import job.
    ///
    /// Recorded on the job row and surfaced on status queries rather than
    /// thrown to the request that triggered the job.
    PipelineFailure {
        /// The job that failed.
        job_id: String,
        /// Why the job failed.
        reason: String,
    },

    /// Non-retryable database operation failure.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// Cold storage adapter failure that is not retryable.
    StorageError {
        /// The storage location involved.
        location: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the stable error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::JobNotFound { .. } => "JOB_NOT_FOUND",
            Self::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::TransientStoreError { .. } => "TRANSIENT_STORE_ERROR",
            Self::PipelineFailure { .. } => "PIPELINE_FAILURE",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
            Self::StorageError { .. } => "STORAGE_ERROR",
        }
    }

    /// Whether the pipeline should retry the operation that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStoreError { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelNotFound { model } => {
                write!(f, "Model '{}' is not archivable", model)
            }
            Self::JobNotFound { job_id } => {
                write!(f, "Job '{}' not found", job_id)
            }
            Self::RecordNotFound { model, record_id } => {
                write!(f, "Record '{}' of model '{}' not found", record_id, model)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::TransientStoreError { operation, details } => {
                write!(f, "Transient store error during '{}': {}", operation, details)
            }
            Self::PipelineFailure { job_id, reason } => {
                write!(f, "Job '{}' failed: {}", job_id, reason)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
            Self::StorageError { location, details } => {
                write!(f, "Storage error at '{}': {}", location, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => CoreError::TransientStoreError {
                operation: "query".to_string(),
                details: e.to_string(),
            },
            sqlx::Error::PoolTimedOut => CoreError::TransientStoreError {
                operation: "acquire".to_string(),
                details: "connection pool timed out".to_string(),
            },
            other => CoreError::DatabaseError {
                operation: "query".to_string(),
                details: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                CoreError::ModelNotFound {
                    model: "Product".to_string(),
                },
                "MODEL_NOT_FOUND",
            ),
            (
                CoreError::JobNotFound {
                    job_id: "j-1".to_string(),
                },
                "JOB_NOT_FOUND",
            ),
            (
                CoreError::RecordNotFound {
                    model: "Product".to_string(),
                    record_id: "r-1".to_string(),
                },
                "RECORD_NOT_FOUND",
            ),
            (
                CoreError::ValidationError {
                    field: "where".to_string(),
                    message: "unknown column".to_string(),
                },
                "VALIDATION_ERROR",
            ),
            (
                CoreError::TransientStoreError {
                    operation: "query".to_string(),
                    details: "connection reset".to_string(),
                },
                "TRANSIENT_STORE_ERROR",
            ),
            (
                CoreError::PipelineFailure {
                    job_id: "j-1".to_string(),
                    reason: "export aborted".to_string(),
                },
                "PIPELINE_FAILURE",
            ),
            (
                CoreError::DatabaseError {
                    operation: "insert".to_string(),
                    details: "constraint violation".to_string(),
                },
                "DATABASE_ERROR",
            ),
            (
                CoreError::StorageError {
                    location: "Product/r-1.json".to_string(),
                    details: "blob missing".to_string(),
                },
                "STORAGE_ERROR",
            ),
        ];

        for (error, expected_code) in test_cases {
            assert_eq!(
                error.error_code(),
                expected_code,
                "Error {:?} should have code {}",
                error,
                expected_code
            );
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_only_transient_store_errors_retry() {
        assert!(
            CoreError::TransientStoreError {
                operation: "write".to_string(),
                details: "timeout".to_string(),
            }
            .is_transient()
        );
        assert!(
            !CoreError::StorageError {
                location: "x".to_string(),
                details: "gone".to_string(),
            }
            .is_transient()
        );
        assert!(
            !CoreError::DatabaseError {
                operation: "insert".to_string(),
                details: "bad".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_display() {
        let err = CoreError::ModelNotFound {
            model: "Invoice".to_string(),
        };
        assert_eq!(err.to_string(), "Model 'Invoice' is not archivable");

        let err = CoreError::JobNotFound {
            job_id: "abc-123".to_string(),
        };
        assert_eq!(err.to_string(), "Job 'abc-123' not found");

        let err = CoreError::PipelineFailure {
            job_id: "abc-123".to_string(),
            reason: "cold storage unreachable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Job 'abc-123' failed: cold storage unreachable"
        );
    }

    #[test]
    fn test_sqlx_io_errors_map_to_transient() {
        let io = sqlx::Error::Io(std::io::Error::other("reset"));
        let err = CoreError::from(io);
        assert!(err.is_transient());

        let row = sqlx::Error::RowNotFound;
        let err = CoreError::from(row);
        assert!(!err.is_transient());
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }
}
