// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bearer JWT verification and the archival permission gate.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

/// Permission claim required for archival routes.
pub const ARCHIVE_PERMISSION: &str = "ArchiveRecords";

/// Claims carried by Coldline bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    /// Expiry as a unix timestamp.
    pub exp: u64,
    /// Granted permissions; `"*"` grants everything.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Claims {
    /// Whether the token may use the archival routes.
    pub fn can_archive(&self) -> bool {
        self.permissions
            .iter()
            .any(|p| p == "*" || p == ARCHIVE_PERMISSION)
    }
}

/// Verifies HS256 bearer tokens against a symmetric secret.
pub struct AuthVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    /// Create a verifier for an HS256 symmetric secret.
    pub fn hs256(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Extract and verify the bearer token from request headers.
    pub fn verify(&self, headers: &HeaderMap) -> Result<Claims, ApiError> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized("missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("expected a bearer token"))?;

        let data = decode::<Claims>(token.trim(), &self.decoding_key, &self.validation)
            .map_err(|_| ApiError::Unauthorized("invalid token"))?;

        Ok(data.claims)
    }
}

/// Middleware verifying the bearer token on every request.
///
/// When the server runs without a configured secret the gate is a
/// pass-through and no claims are attached.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(auth) = &state.auth {
        let claims = auth.verify(req.headers())?;
        req.extensions_mut().insert(claims);
    }
    Ok(next.run(req).await)
}

/// Middleware requiring the archival permission on top of a valid token.
pub async fn require_archive_permission(
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(claims) = req.extensions().get::<Claims>()
        && !claims.can_archive()
    {
        return Err(ApiError::Forbidden("archival permission required"));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, permissions: &[&str]) -> String {
        let claims = Claims {
            sub: "tester".to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as u64,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_verify_accepts_valid_token() {
        let verifier = AuthVerifier::hs256("s3cret");
        let headers = bearer_headers(&token("s3cret", &[ARCHIVE_PERMISSION]));

        let claims = verifier.verify(&headers).unwrap();
        assert_eq!(claims.sub, "tester");
        assert!(claims.can_archive());
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let verifier = AuthVerifier::hs256("s3cret");
        let headers = bearer_headers(&token("other", &[]));

        assert!(matches!(
            verifier.verify(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_verify_rejects_missing_and_malformed_headers() {
        let verifier = AuthVerifier::hs256("s3cret");

        assert!(verifier.verify(&HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(verifier.verify(&headers).is_err());
    }

    #[test]
    fn test_wildcard_permission_can_archive() {
        let claims = Claims {
            sub: "admin".to_string(),
            exp: 0,
            permissions: vec!["*".to_string()],
        };
        assert!(claims.can_archive());

        let claims = Claims {
            sub: "viewer".to_string(),
            exp: 0,
            permissions: vec!["ReadProducts".to_string()],
        };
        assert!(!claims.can_archive());
    }
}
