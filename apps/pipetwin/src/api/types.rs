//! # API Request/Response Types
//!
//! JSON bodies and query strings of the HTTP API, plus the error body every
//! failed request returns: `{"error": "<code>"}`, with `"reason"` added for
//! sync failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pipetwin_core::{ErrorKind, Properties, ThresholdBounds, TwinError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// LIST RESPONSES
// =============================================================================

/// `{"list": [...]}` wrapper used by every collection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub list: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(list: Vec<T>) -> Self {
        Self { list }
    }
}

/// Audit history of one feature, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse<T> {
    pub feature_id: String,
    pub list: Vec<T>,
}

// =============================================================================
// TWIN QUERIES
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceQuery {
    #[serde(default)]
    pub start_id: String,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureLatestQuery {
    #[serde(default)]
    pub feature_ids: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

// =============================================================================
// PIPE WRITES
// =============================================================================

/// Body of `PUT /pipes/{id}/geometry`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryUpdateRequest {
    pub geometry: Option<Value>,
    pub updated_by: Option<String>,
}

impl GeometryUpdateRequest {
    pub fn into_parts(self) -> Result<(Value, Option<String>), ApiError> {
        match self.geometry {
            Some(geometry) if geometry.is_object() => Ok((geometry, self.updated_by)),
            Some(Value::Null) | None => Err(ApiError::bad_request("geometry_required")),
            Some(_) => Err(ApiError::bad_request("invalid_geometry")),
        }
    }
}

/// Body of `PUT /pipes/{id}/properties`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertiesUpdateRequest {
    pub properties: Option<Value>,
    pub visible: Option<Value>,
    pub updated_by: Option<String>,
}

/// A validated properties write.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesUpdate {
    pub properties: Properties,
    pub visible: Option<bool>,
    pub updated_by: Option<String>,
}

impl PropertiesUpdateRequest {
    /// `properties` must be an object; `visible`, when present and not
    /// null, must be a boolean.
    pub fn validate(self) -> Result<PropertiesUpdate, ApiError> {
        let properties = match self.properties {
            Some(value @ Value::Object(_)) => serde_json::from_value(value)
                .map_err(|_| ApiError::bad_request("invalid_properties"))?,
            Some(Value::Null) | None => return Err(ApiError::bad_request("properties_required")),
            Some(_) => return Err(ApiError::bad_request("invalid_properties")),
        };
        let visible = match self.visible {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(flag),
            Some(_) => return Err(ApiError::bad_request("visible_required")),
        };
        Ok(PropertiesUpdate {
            properties,
            visible,
            updated_by: self.updated_by,
        })
    }
}

// =============================================================================
// TELEMETRY
// =============================================================================

/// Body of `PUT /telemetry/thresholds`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRequest {
    #[serde(default)]
    pub point_id: String,
    #[serde(default)]
    pub metric: String,
    pub warn_low: Option<f64>,
    pub warn_high: Option<f64>,
    pub alarm_low: Option<f64>,
    pub alarm_high: Option<f64>,
    pub enabled: Option<bool>,
}

impl ThresholdRequest {
    pub fn bounds(&self) -> ThresholdBounds {
        ThresholdBounds {
            warn_low: self.warn_low,
            warn_high: self.warn_high,
            alarm_low: self.alarm_low,
            alarm_high: self.alarm_high,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestQuery {
    pub point_ids: Option<String>,
    pub metric: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub point_id: String,
    pub metric: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsQuery {
    pub point_id: Option<String>,
    pub limit: Option<i64>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Wire form of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A failed request: HTTP status plus stable error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub reason: Option<&'static str>,
}

impl ApiError {
    pub const fn bad_request(code: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            reason: None,
        }
    }

    pub const fn internal(code: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            reason: None,
        }
    }
}

/// HTTP status of an engine error kind.
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::SyncFailure => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TwinError> for ApiError {
    fn from(err: TwinError) -> Self {
        let status = status_for(err.kind());
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "request failed");
        } else {
            tracing::debug!(code = err.code(), error = %err, "request rejected");
        }
        Self {
            status,
            code: err.code(),
            reason: err.sync_reason().map(|r| r.as_str()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.to_string(),
            reason: self.reason.map(str::to_string),
        };
        (self.status, Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
