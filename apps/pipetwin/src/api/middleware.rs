//! # Middleware Module
//!
//! Global rate limiting for the HTTP API, sized by `security.rate_limit`
//! (requests per second, `PIPETWIN_RATE_LIMIT`).

use crate::config::DEFAULT_RATE_LIMIT;
use super::types::ApiError;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a global rate limiter. Zero falls back to the default rate.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second)
        .or(NonZeroU32::new(DEFAULT_RATE_LIMIT))
        .unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

const TOO_MANY_REQUESTS: ApiError = ApiError {
    status: StatusCode::TOO_MANY_REQUESTS,
    code: "rate_limited",
    reason: None,
};

/// Reject the request with 429 once the global quota is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
        return Err(TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_admits_first_request() {
        assert!(create_rate_limiter(50).check().is_ok());
    }

    #[test]
    fn zero_uses_default_rate() {
        assert!(create_rate_limiter(0).check().is_ok());
    }

    #[test]
    fn quota_is_enforced() {
        let limiter = create_rate_limiter(1);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
