// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server configuration loading from environment variables.

use std::net::SocketAddr;

use coldline_core::config::ConfigError;

/// Coldline server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,
    /// Symmetric secret for bearer JWT verification.
    ///
    /// When unset, authentication is disabled and every route is open.
    pub jwt_secret: Option<String>,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `COLDLINE_HTTP_PORT`: HTTP listen port (default: 3000)
    /// - `COLDLINE_JWT_SECRET`: HS256 secret; unset disables auth
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_port: u16 = std::env::var("COLDLINE_HTTP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("COLDLINE_HTTP_PORT", "must be a valid port number")
            })?;

        let jwt_secret = std::env::var("COLDLINE_JWT_SECRET").ok();
        if let Some(secret) = &jwt_secret
            && secret.is_empty()
        {
            return Err(ConfigError::Invalid(
                "COLDLINE_JWT_SECRET",
                "must not be empty",
            ));
        }

        Ok(Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            jwt_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.remove("COLDLINE_HTTP_PORT");
        guard.remove("COLDLINE_JWT_SECRET");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.http_addr.port(), 3000);
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_invalid_port() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("COLDLINE_HTTP_PORT", "not-a-port");

        assert!(ServerConfig::from_env().is_err());
    }

    #[test]
    fn test_jwt_secret_loaded() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.remove("COLDLINE_HTTP_PORT");
        guard.set("COLDLINE_JWT_SECRET", "s3cret");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
    }
}
