//! # API Endpoint Handlers
//!
//! Every engine call is synchronous redb work, so handlers move it onto
//! tokio's blocking pool through [`run_blocking`].

use super::{
    AppState,
    types::{
        AlertsQuery, ApiError, AuditQuery, AuditResponse, FeatureLatestQuery,
        GeometryUpdateRequest, HealthResponse, HistoryQuery, LatestQuery, ListResponse,
        PropertiesUpdateRequest, ThresholdRequest, TraceQuery,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use pipetwin_core::{
    AlertEvent, AuditLogEntry, Catalog, Drilldown, IngestOutcome, MetricLatest, MetricSample,
    MutationReceipt, SeedReport, StoreStats, TelemetrySample, ThresholdRule, TraceResult,
    TwinEngine, TwinError, telemetry::split_id_list,
};
use std::sync::Arc;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run `op` against the engine on the blocking pool.
async fn run_blocking<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&TwinEngine) -> Result<T, TwinError> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    match tokio::task::spawn_blocking(move || op(&engine)).await {
        Ok(result) => result.map(Json).map_err(ApiError::from),
        Err(e) => {
            tracing::error!(error = %e, "engine task failed");
            Err(ApiError::internal("internal_error"))
        }
    }
}

/// Unwrap a JSON body, answering `invalid_json` for anything axum rejects.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected request body");
        ApiError::bad_request("invalid_json")
    })
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Row counts of every table.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StoreStats> {
    run_blocking(&state, |engine| engine.stats()).await
}

// =============================================================================
// TWIN READS
// =============================================================================

pub async fn drilldown_handler(
    State(state): State<AppState>,
    Path(feature_id): Path<String>,
) -> ApiResult<Drilldown> {
    run_blocking(&state, move |engine| engine.drilldown(&feature_id)).await
}

pub async fn trace_handler(
    State(state): State<AppState>,
    Query(query): Query<TraceQuery>,
) -> ApiResult<TraceResult> {
    run_blocking(&state, move |engine| {
        engine.trace(&query.start_id, query.direction.as_deref())
    })
    .await
}

/// Latest readings of the sensor points attached to the given features.
pub async fn feature_latest_handler(
    State(state): State<AppState>,
    Query(query): Query<FeatureLatestQuery>,
) -> ApiResult<ListResponse<MetricLatest>> {
    let feature_ids = split_id_list(&query.feature_ids);
    run_blocking(&state, move |engine| {
        engine.latest_by_features(&feature_ids).map(ListResponse::from)
    })
    .await
}

pub async fn audit_handler(
    State(state): State<AppState>,
    Path(feature_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<AuditResponse<AuditLogEntry>> {
    run_blocking(&state, move |engine| {
        let list = engine.list_audit_log(&feature_id, query.limit)?;
        Ok(AuditResponse {
            feature_id: feature_id.trim().to_string(),
            list,
        })
    })
    .await
}

// =============================================================================
// PIPE WRITES
// =============================================================================

pub async fn geometry_update_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<GeometryUpdateRequest>, JsonRejection>,
) -> ApiResult<MutationReceipt> {
    let (geometry, updated_by) = json_body(body)?.into_parts()?;
    run_blocking(&state, move |engine| {
        engine.update_pipe_geometry(&id, geometry, updated_by.as_deref())
    })
    .await
}

pub async fn properties_update_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<PropertiesUpdateRequest>, JsonRejection>,
) -> ApiResult<MutationReceipt> {
    let update = json_body(body)?.validate()?;
    run_blocking(&state, move |engine| {
        engine.update_pipe_properties(
            &id,
            update.properties,
            update.visible,
            update.updated_by.as_deref(),
        )
    })
    .await
}

// =============================================================================
// TELEMETRY
// =============================================================================

pub async fn ingest_handler(
    State(state): State<AppState>,
    body: Result<Json<TelemetrySample>, JsonRejection>,
) -> ApiResult<IngestOutcome> {
    let sample = json_body(body)?;
    run_blocking(&state, move |engine| engine.ingest_telemetry(&sample)).await
}

pub async fn threshold_handler(
    State(state): State<AppState>,
    body: Result<Json<ThresholdRequest>, JsonRejection>,
) -> ApiResult<ThresholdRule> {
    let request = json_body(body)?;
    run_blocking(&state, move |engine| {
        engine.upsert_threshold(
            &request.point_id,
            &request.metric,
            request.bounds(),
            request.enabled,
        )
    })
    .await
}

pub async fn latest_handler(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<ListResponse<MetricLatest>> {
    let point_ids = query.point_ids.as_deref().map(split_id_list);
    run_blocking(&state, move |engine| {
        engine
            .latest_telemetry(point_ids.as_deref(), query.metric.as_deref(), query.limit)
            .map(ListResponse::from)
    })
    .await
}

pub async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<ListResponse<MetricSample>> {
    run_blocking(&state, move |engine| {
        engine
            .telemetry_history(
                &query.point_id,
                query.metric.as_deref(),
                query.from.as_deref(),
                query.to.as_deref(),
                query.limit,
            )
            .map(ListResponse::from)
    })
    .await
}

pub async fn alerts_handler(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<ListResponse<AlertEvent>> {
    run_blocking(&state, move |engine| {
        engine
            .open_alerts(query.point_id.as_deref(), query.limit)
            .map(ListResponse::from)
    })
    .await
}

// =============================================================================
// CATALOG
// =============================================================================

pub async fn catalog_handler(
    State(state): State<AppState>,
    body: Result<Json<Catalog>, JsonRejection>,
) -> ApiResult<SeedReport> {
    let catalog = json_body(body)?;
    run_blocking(&state, move |engine| engine.seed_catalog(&catalog)).await
}
