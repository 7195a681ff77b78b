// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Coldline engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Root directory of the filesystem cold storage
    pub storage_dir: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `COLDLINE_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `COLDLINE_STORAGE_DIR`: cold storage root (default: `.data/cold-storage`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("COLDLINE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("COLDLINE_DATABASE_URL"))?;

        let storage_dir = std::env::var("COLDLINE_STORAGE_DIR")
            .unwrap_or_else(|_| ".data/cold-storage".to_string());
        if storage_dir.is_empty() {
            return Err(ConfigError::Invalid(
                "COLDLINE_STORAGE_DIR",
                "must not be empty",
            ));
        }

        Ok(Self {
            database_url,
            storage_dir,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
