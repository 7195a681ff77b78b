// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coldline Server - HTTP API binary
//!
//! Wires the archival engine to its REST surface:
//! - connects to PostgreSQL or SQLite based on the database URL scheme
//! - runs embedded migrations
//! - starts the background pipeline worker
//! - serves the product CRUD and archival routes over HTTP

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use coldline_core::config::Config;
use coldline_core::persistence::{Persistence, PostgresPersistence, SqlitePersistence};
use coldline_core::pipeline::PipelineConfig;
use coldline_core::runtime::ArchivalRuntime;
use coldline_core::storage::FsStorage;

use coldline_server::auth::AuthVerifier;
use coldline_server::config::ServerConfig;
use coldline_server::{AppState, build_router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coldline_core=info".parse().unwrap())
                .add_directive("coldline_server=info".parse().unwrap()),
        )
        .init();

    info!("Starting Coldline Server");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    let server_config = ServerConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %server_config.http_addr,
        storage_dir = %config.storage_dir,
        auth = server_config.jwt_secret.is_some(),
        "Configuration loaded"
    );

    // Connect to database and run migrations
    info!("Connecting to database...");
    let persistence: Arc<dyn Persistence> = if config.database_url.starts_with("sqlite") {
        let persistence = SqlitePersistence::from_path(
            config
                .database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:"),
        )
        .await?;
        Arc::new(persistence)
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        coldline_core::migrations::run_postgres(&pool).await?;
        Arc::new(PostgresPersistence::new(pool))
    };

    persistence.health_check_db().await?;
    info!("Database connection established");

    // Cold storage and archival runtime
    let storage = Arc::new(FsStorage::new(&config.storage_dir)?);
    let runtime = ArchivalRuntime::builder()
        .persistence(persistence.clone())
        .storage(storage)
        .pipeline_config(PipelineConfig::from_env())
        .build()?
        .start();

    // HTTP server
    let state = AppState {
        persistence,
        jobs: runtime.jobs().clone(),
        auth: server_config
            .jwt_secret
            .as_deref()
            .map(|secret| Arc::new(AuthVerifier::hs256(secret))),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(server_config.http_addr).await?;
    info!(addr = %server_config.http_addr, "Coldline Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down pipeline");
    runtime.shutdown().await?;
    info!("Coldline Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
