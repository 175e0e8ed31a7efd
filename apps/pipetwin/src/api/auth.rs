//! # Authentication Module
//!
//! Optional bearer-token authentication for the HTTP API.
//!
//! When `security.api_key` (or `PIPETWIN_API_KEY`) is set, every request
//! except `GET /health` must carry:
//! ```text
//! Authorization: Bearer <api-key>
//! ```

use super::types::ApiError;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The expected API key, shared by every request.
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    /// Compare in constant time over the longer of the two keys, so neither
    /// the content nor the length of the expected key leaks through timing.
    pub fn matches(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let expected = self.0.as_bytes();

        let len = provided.len().max(expected.len());
        let mut padded_provided = vec![0u8; len];
        let mut padded_expected = vec![0u8; len];
        padded_provided[..provided.len()].copy_from_slice(provided);
        padded_expected[..expected.len()].copy_from_slice(expected);

        let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
        bytes_match && provided.len() == expected.len()
    }
}

const UNAUTHORIZED: ApiError = ApiError {
    status: StatusCode::UNAUTHORIZED,
    code: "unauthorized",
    reason: None,
};

/// API key authentication middleware.
pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(token) if key.matches(token) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(event = "auth_failure", reason = "invalid_api_key", "authentication failed");
            Err(UNAUTHORIZED)
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "missing Authorization header"
            );
            Err(UNAUTHORIZED)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison() {
        let key = ApiKey::new("s3cret");
        assert!(key.matches("s3cret"));
        assert!(!key.matches("s3cre"));
        assert!(!key.matches("s3cret!"));
        assert!(!key.matches(""));
    }
}
