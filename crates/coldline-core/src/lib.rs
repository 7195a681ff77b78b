// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coldline Core - Record Archival Engine
//!
//! This crate moves cold records out of a live relational store into
//! cheap long-term storage, and brings them back on demand. Callers
//! request archival or retrieval of a model's records and get a job id
//! back immediately; a background pipeline performs the actual data
//! movement and records its progress in the job table.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     HTTP Clients                         │
//! └──────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    coldline-server                       │
//! │        (REST API: products CRUD, archive, jobs)          │
//! └──────────────────────────────────────────────────────────┘
//!              │                              │
//!              │ JobService                   │ Persistence
//!              ▼                              ▼
//! ┌───────────────────────┐       ┌──────────────────────────┐
//! │    coldline-core      │──────►│   PostgreSQL / SQLite    │
//! │   (This Crate)        │       │ products, mappings, jobs │
//! │   Pipeline Worker     │       └──────────────────────────┘
//! └───────────┬───────────┘
//!             │ ColdStorage
//!             ▼
//! ┌───────────────────────┐
//! │     Cold Storage      │
//! │ (filesystem / memory) │
//! └───────────────────────┘
//! ```
//!
//! # Operations
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | `request_archive` | Create an export job for matching live records; queued immediately |
//! | `request_retrieval` | Create an import job for archived records; runs once triggered |
//! | `trigger_import` | Release a retrieval job to the pipeline (idempotent) |
//! | `get_job` | Query a job's status, error and timestamps |
//!
//! Exports serialize each matching record to cold storage, write an
//! archive mapping and delete the live row in one transaction per
//! record. Imports read blobs back, reinsert live rows insert-or-ignore
//! and delete the mappings. A record is therefore always either fully
//! live or fully archived, never both and never neither.
//!
//! # Job Status State Machine
//!
//! ```text
//!      ┌─────────┐
//!      │ PENDING │
//!      └────┬────┘
//!           │ claim
//!           ▼
//!      ┌─────────┐
//!      │ RUNNING │──────────┐
//!      └────┬────┘          │
//!           │               │
//!    complete│           fail
//!           ▼               ▼
//!    ┌───────────┐    ┌────────┐
//!    │ SUCCEEDED │    │ FAILED │
//!    └───────────┘    └────────┘
//! ```
//!
//! Transitions are monotonic: once terminal, a job's status never
//! changes again.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `COLDLINE_DATABASE_URL` | Yes | - | PostgreSQL or SQLite connection string |
//! | `COLDLINE_STORAGE_DIR` | No | `.data/cold-storage` | Filesystem cold storage root |
//! | `COLDLINE_PIPELINE_POLL_INTERVAL_MS` | No | `500` | Job poll interval |
//! | `COLDLINE_PIPELINE_MAX_ATTEMPTS` | No | `3` | Attempts per transient failure |
//! | `COLDLINE_PIPELINE_RETRY_BASE_MS` | No | `100` | Initial retry backoff |
//!
//! # Modules
//!
//! - [`config`]: Engine configuration from environment variables
//! - [`condition`]: Selection-condition builder for archival operations
//! - [`error`]: Error types with stable error codes
//! - [`filter`]: Query filters over live records and archive mappings
//! - [`jobs`]: Job requestor, import trigger and status queries
//! - [`migrations`]: Embedded database migrations
//! - [`persistence`]: PostgreSQL and SQLite backends
//! - [`pipeline`]: Background worker executing archive/restore jobs
//! - [`runtime`]: Embeddable runtime wiring it all together
//! - [`storage`]: Cold storage adapters

#![deny(missing_docs)]

/// Selection-condition builder for archival operations.
pub mod condition;

/// Engine configuration loaded from environment variables.
pub mod config;

/// Error types for archival operations with stable error codes.
pub mod error;

/// Query filters over live records and archive mappings.
pub mod filter;

/// Archive job requestor, import trigger and status queries.
pub mod jobs;

/// Embedded database migrations for PostgreSQL and SQLite.
pub mod migrations;

/// Persistence interfaces with PostgreSQL and SQLite backends.
pub mod persistence;

/// Background pipeline executing archive and restore jobs.
pub mod pipeline;

/// Embeddable runtime wiring persistence, storage and the pipeline.
pub mod runtime;

/// Cold storage adapters (filesystem, in-memory).
pub mod storage;
