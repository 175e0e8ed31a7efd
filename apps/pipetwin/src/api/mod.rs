//! # pipetwin HTTP API Module
//!
//! The HTTP REST surface of the twin engine, built on axum.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Health check
//! - `GET  /api/v1/status` - Row counts
//! - `GET  /api/v1/twin/drilldown/{featureId}` - Impact neighborhood of a pipe
//! - `GET  /api/v1/twin/trace?startId&direction` - Upstream/downstream trace
//! - `GET  /api/v1/twin/telemetry/latest?featureIds=a,b` - Latest readings by feature
//! - `PUT  /api/v1/twin/pipes/{id}/geometry` - Replace pipe geometry
//! - `PUT  /api/v1/twin/pipes/{id}/properties` - Replace pipe properties
//! - `GET  /api/v1/twin/audit/{featureId}?limit` - Audit history
//! - `POST /api/v1/telemetry/ingest` - Ingest one sample
//! - `PUT  /api/v1/telemetry/thresholds` - Upsert a threshold rule
//! - `GET  /api/v1/telemetry/latest?pointIds&metric&limit` - Latest readings
//! - `GET  /api/v1/telemetry/history?pointId&metric&from&to&limit` - History
//! - `GET  /api/v1/telemetry/alerts?pointId&limit` - Open alerts
//! - `POST /api/v1/catalog` - Seed features and reference assets
//!
//! ## Security
//!
//! Taken from the `[security]` config section: bearer API key, global rate
//! limit and CORS origins.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::ApiKey;
pub use middleware::create_rate_limiter;
pub use types::{
    ApiError, AuditResponse, ErrorBody, GeometryUpdateRequest, HealthResponse, ListResponse,
    PropertiesUpdateRequest, ThresholdRequest,
};

use crate::config::SecurityConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use pipetwin_core::TwinEngine;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body (catalog documents included).
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TwinEngine>,
    pub security: SecurityConfig,
}

impl AppState {
    #[must_use]
    pub fn new(engine: TwinEngine, security: SecurityConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            security,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer:
/// - `["*"]` allows every origin
/// - absent or no valid origin means localhost only
/// - otherwise the listed origins
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = origins else {
        tracing::info!("CORS: no origins configured, defaulting to localhost only");
        return build_localhost_cors();
    };

    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: allowing ALL origins; do not use in production");
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => {
                tracing::info!(origin = %origin, "CORS: allowing origin");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "CORS: invalid origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        tracing::warn!("CORS: no valid origins, defaulting to localhost only");
        return build_localhost_cors();
    }
    with_methods(CorsLayer::new().allow_origin(allowed))
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    with_methods(CorsLayer::new().allow_origin(origins))
}

fn with_methods(layer: CorsLayer) -> CorsLayer {
    layer
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting (if enabled)
/// 4. Authentication (if an API key is configured)
pub fn create_router(state: AppState) -> Router {
    let security = state.security.clone();
    let cors = build_cors_layer(security.cors_origins.as_deref());

    let twin = Router::new()
        .route("/drilldown/{feature_id}", get(handlers::drilldown_handler))
        .route("/trace", get(handlers::trace_handler))
        .route("/telemetry/latest", get(handlers::feature_latest_handler))
        .route("/pipes/{id}/geometry", put(handlers::geometry_update_handler))
        .route("/pipes/{id}/properties", put(handlers::properties_update_handler))
        .route("/audit/{feature_id}", get(handlers::audit_handler));

    let telemetry = Router::new()
        .route("/ingest", post(handlers::ingest_handler))
        .route("/thresholds", put(handlers::threshold_handler))
        .route("/latest", get(handlers::latest_handler))
        .route("/history", get(handlers::history_handler))
        .route("/alerts", get(handlers::alerts_handler));

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/v1/status", get(handlers::status_handler))
        .route("/api/v1/catalog", post(handlers::catalog_handler))
        .nest("/api/v1/twin", twin)
        .nest("/api/v1/telemetry", telemetry);

    match security.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::new(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => {
            tracing::warn!(
                "API key authentication DISABLED: all endpoints are publicly accessible. \
                 Set security.api_key or PIPETWIN_API_KEY to enable it."
            );
        }
    }

    if security.rate_limit > 0 {
        tracing::info!(rps = security.rate_limit, "rate limiting enabled");
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(security.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("rate limiting disabled");
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve the API on `addr` until the process receives Ctrl+C.
pub async fn run_server(
    addr: &str,
    engine: TwinEngine,
    security: SecurityConfig,
) -> std::io::Result<()> {
    let router = create_router(AppState::new(engine, security));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(addr, "pipetwin HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}

// =============================================================================
// TESTS
// =============================================================================
