// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP error mapping for the Coldline API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coldline_core::error::CoreError;
use serde_json::json;
use tracing::error;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An engine operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The request carried no valid bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    /// The token is valid but lacks the required permission.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &str) {
        match self {
            Self::Core(e) => {
                let status = match e.error_code() {
                    "MODEL_NOT_FOUND" | "JOB_NOT_FOUND" | "RECORD_NOT_FOUND" => {
                        StatusCode::NOT_FOUND
                    }
                    "VALIDATION_ERROR" => StatusCode::UNPROCESSABLE_ENTITY,
                    "TRANSIENT_STORE_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.error_code())
            }
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the logs, not in 5xx bodies.
        let message = if status.is_server_error() {
            error!(code, error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
