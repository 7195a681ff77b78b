// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coldline Server - HTTP API
//!
//! REST surface over the coldline-core archival engine:
//!
//! | Method | Path | Behavior |
//! |--------|------|----------|
//! | POST | `/products` | create product |
//! | GET | `/products` | list with optional `filter` |
//! | PATCH | `/products` | bulk update by `where`, returns count |
//! | GET | `/products/count` | count with optional `where` |
//! | GET | `/products/{id}` | fetch by id |
//! | PATCH | `/products/{id}` | partial update |
//! | PUT | `/products/{id}` | replace |
//! | DELETE | `/products/{id}` | delete |
//! | DELETE | `/products/archive` | archive matching records (export job) |
//! | GET | `/products/archive` | retrieval job + fire-and-forget import |
//! | GET | `/jobs/{id}` | job status query |
//! | GET | `/health` | liveness + database ping |
//!
//! All routes except `/health` pass the bearer JWT gate when a secret is
//! configured; archival routes additionally require the
//! `ArchiveRecords` permission claim.

#![deny(missing_docs)]

/// Bearer JWT verification and the archival permission gate.
pub mod auth;

/// Server configuration loaded from environment variables.
pub mod config;

/// HTTP error mapping.
pub mod error;

/// Request handlers.
pub mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use coldline_core::jobs::JobService;
use coldline_core::persistence::Persistence;

use crate::auth::AuthVerifier;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend for the live store and jobs.
    pub persistence: Arc<dyn Persistence>,
    /// Archive job service.
    pub jobs: Arc<JobService>,
    /// Token verifier; `None` disables authentication.
    pub auth: Option<Arc<AuthVerifier>>,
}

/// Build the API router over the given state.
pub fn build_router(state: AppState) -> Router {
    let archival = Router::new()
        .route(
            "/products/archive",
            delete(handlers::archive_products).get(handlers::get_archived_products),
        )
        .route("/jobs/{id}", get(handlers::get_job))
        .layer(middleware::from_fn(auth::require_archive_permission));

    let api = Router::new()
        .route(
            "/products",
            post(handlers::create_product)
                .get(handlers::list_products)
                .patch(handlers::update_products),
        )
        .route("/products/count", get(handlers::count_products))
        .route(
            "/products/{id}",
            get(handlers::get_product)
                .patch(handlers::patch_product)
                .put(handlers::replace_product)
                .delete(handlers::delete_product),
        )
        .merge(archival)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
