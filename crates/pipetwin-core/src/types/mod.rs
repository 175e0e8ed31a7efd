//! # Core Type Definitions
//!
//! This module contains all shared types for the pipetwin engine:
//! - Free-form property maps with explicit merge rules (`Properties`)
//! - Closed vocabularies (`Metric`, `Severity`, `Direction`, `AuditAction`)
//! - Asset and feature records (`assets`)
//! - Telemetry records (`telemetry`)
//! - Error types (`TwinError`, `ErrorKind`, `SyncFailure`)
//!
//! All records serialize with camelCase field names. Stored records are
//! encoded with postcard through [`crate::codec`].

mod assets;
mod telemetry;

pub use assets::{
    AssetNode, AssetRelation, AuditLogEntry, Building, Equipment, EquipmentEntry, Feature,
    LinkedBuilding, NearbyFeature, PipeSegment, Room, Valve,
};
pub use telemetry::{
    AlertEvent, IngestOutcome, MetricLatest, MetricSample, RuleState, SensorPoint,
    TelemetrySample, ThresholdBounds, ThresholdRule,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// PROPERTIES
// =============================================================================

/// Arbitrary key/value map attached to features and assets.
///
/// The engine only reads the handful of keys it derives attributes from; the
/// rest is opaque and must survive every upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Map<String, Value>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build from a JSON value. Only objects are accepted.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Trimmed, non-empty textual form of a scalar property.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        let raw = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        if raw.is_empty() { None } else { Some(raw) }
    }

    /// Map union where every incoming key wins.
    pub fn merge(&mut self, incoming: &Properties) {
        for (key, value) in &incoming.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Map union where incoming values overwrite existing ones only on the
    /// declared derived keys. Other existing keys are left untouched, other
    /// incoming keys are added only when absent.
    pub fn merge_derived(&mut self, incoming: &Properties, derived_keys: &[&str]) {
        for (key, value) in &incoming.0 {
            if derived_keys.contains(&key.as_str()) || !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        crate::codec::json_text::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        crate::codec::json_text::deserialize(deserializer).map(Self)
    }
}

// =============================================================================
// VOCABULARIES
// =============================================================================

/// The fixed set of telemetry metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Pressure,
    Flow,
    Turbidity,
    Chlorine,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Pressure,
        Metric::Flow,
        Metric::Turbidity,
        Metric::Chlorine,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Metric::Pressure => "pressure",
            Metric::Flow => "flow",
            Metric::Turbidity => "turbidity",
            Metric::Chlorine => "chlorine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| TwinError::InvalidMetric(s.to_string()))
    }
}

/// Alert severity. Alarm bounds are critical, warn bounds are warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace direction over the directed segment graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
}

impl Direction {
    /// `"up"` in any case selects upstream; anything else, including no
    /// value, is downstream.
    #[must_use]
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("up") => Direction::Up,
            _ => Direction::Down,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Action tag of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    GeometryUpdate,
    PropertiesUpdate,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::GeometryUpdate => "geometry_update",
            AuditAction::PropertiesUpdate => "properties_update",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input; nothing was written.
    Validation,
    /// Target id absent.
    NotFound,
    /// Duplicate id on create.
    Conflict,
    /// Derived graph could not be synchronized; the triggering write was rolled back.
    SyncFailure,
    /// Storage or encoding fault.
    Internal,
}

/// Why a topology or segment synchronization failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFailure {
    LineGeometryRequired,
    FeatureNotFound,
}

impl SyncFailure {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncFailure::LineGeometryRequired => "line_geometry_required",
            SyncFailure::FeatureNotFound => "feature_not_found",
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the pipetwin engine.
///
/// - No silent failures
/// - Use `Result<T, TwinError>` for fallible operations
/// - The engine never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum TwinError {
    #[error("pointId is required")]
    PointIdRequired,

    #[error("metric must be one of pressure, flow, turbidity, chlorine (got {0:?})")]
    InvalidMetric(String),

    #[error("value must be a finite number")]
    ValueRequired,

    #[error("sampledAt is not an RFC 3339 timestamp: {0:?}")]
    InvalidSampledAt(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("id is required")]
    IdRequired,

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("feature {0} does not reduce to a single line")]
    LineGeometryRequired(String),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    #[error("{kind} already exists: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("topology sync failed for {feature_id}: {reason}")]
    TopologySyncFailed {
        feature_id: String,
        reason: SyncFailure,
    },

    #[error("segment sync failed for {feature_id}: {reason}")]
    SegmentSyncFailed {
        feature_id: String,
        reason: SyncFailure,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TwinError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            TwinError::PointIdRequired
            | TwinError::InvalidMetric(_)
            | TwinError::ValueRequired
            | TwinError::InvalidSampledAt(_)
            | TwinError::InvalidTimeRange(_)
            | TwinError::IdRequired
            | TwinError::InvalidGeometry(_)
            | TwinError::LineGeometryRequired(_)
            | TwinError::InvalidCatalog(_) => ErrorKind::Validation,
            TwinError::FeatureNotFound(_) => ErrorKind::NotFound,
            TwinError::Duplicate { .. } => ErrorKind::Conflict,
            TwinError::TopologySyncFailed { .. } | TwinError::SegmentSyncFailed { .. } => {
                ErrorKind::SyncFailure
            }
            TwinError::Storage(_) | TwinError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            TwinError::PointIdRequired => "point_id_required",
            TwinError::InvalidMetric(_) => "invalid_metric",
            TwinError::ValueRequired => "value_required",
            TwinError::InvalidSampledAt(_) => "invalid_sampled_at",
            TwinError::InvalidTimeRange(_) => "invalid_time_range",
            TwinError::IdRequired => "id_required",
            TwinError::InvalidGeometry(_) => "invalid_geometry",
            TwinError::LineGeometryRequired(_) => "line_geometry_required",
            TwinError::InvalidCatalog(_) => "invalid_catalog",
            TwinError::FeatureNotFound(_) => "not_found",
            TwinError::Duplicate { .. } => "duplicate",
            TwinError::TopologySyncFailed { .. } => "topology_sync_failed",
            TwinError::SegmentSyncFailed { .. } => "segment_sync_failed",
            TwinError::Storage(_) => "storage_error",
            TwinError::Serialization(_) => "serialization_error",
        }
    }

    /// The underlying reason of a sync failure, if this is one.
    #[must_use]
    pub const fn sync_reason(&self) -> Option<SyncFailure> {
        match self {
            TwinError::TopologySyncFailed { reason, .. }
            | TwinError::SegmentSyncFailed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metric_parse_is_exact_after_trim() {
        assert_eq!(" flow ".parse::<Metric>().ok(), Some(Metric::Flow));
        assert!(matches!(
            "Pressure".parse::<Metric>(),
            Err(TwinError::InvalidMetric(_))
        ));
        assert!(matches!(
            "temperature".parse::<Metric>(),
            Err(TwinError::InvalidMetric(_))
        ));
    }

    #[test]
    fn direction_defaults_to_down() {
        assert_eq!(Direction::parse_lenient(Some("UP")), Direction::Up);
        assert_eq!(Direction::parse_lenient(Some("down")), Direction::Down);
        assert_eq!(Direction::parse_lenient(Some("sideways")), Direction::Down);
        assert_eq!(Direction::parse_lenient(None), Direction::Down);
    }

    #[test]
    fn merge_lets_incoming_win() {
        let mut existing = Properties::new().with("a", 1).with("b", "keep");
        existing.merge(&Properties::new().with("a", 2).with("c", true));
        assert_eq!(existing.get("a"), Some(&json!(2)));
        assert_eq!(existing.get("b"), Some(&json!("keep")));
        assert_eq!(existing.get("c"), Some(&json!(true)));
    }

    #[test]
    fn merge_derived_protects_hand_entered_keys() {
        let mut existing = Properties::new()
            .with("lon", 1.0)
            .with("label", "hand entered");
        let incoming = Properties::new()
            .with("lon", 2.0)
            .with("label", "derived")
            .with("autoSynced", true);
        existing.merge_derived(&incoming, &["lon", "autoSynced"]);
        assert_eq!(existing.get("lon"), Some(&json!(2.0)));
        assert_eq!(existing.get("label"), Some(&json!("hand entered")));
        assert_eq!(existing.get("autoSynced"), Some(&json!(true)));
    }

    #[test]
    fn text_trims_and_skips_blank() {
        let props = Properties::new()
            .with("name", "  Main St ")
            .with("blank", "   ")
            .with("n", 300)
            .with("obj", json!({"x": 1}));
        assert_eq!(props.text("name").as_deref(), Some("Main St"));
        assert_eq!(props.text("blank"), None);
        assert_eq!(props.text("n").as_deref(), Some("300"));
        assert_eq!(props.text("obj"), None);
        assert_eq!(props.text("missing"), None);
    }

    #[test]
    fn error_kinds_and_codes() {
        assert_eq!(TwinError::PointIdRequired.kind(), ErrorKind::Validation);
        assert_eq!(
            TwinError::FeatureNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        let sync = TwinError::TopologySyncFailed {
            feature_id: "f".into(),
            reason: SyncFailure::LineGeometryRequired,
        };
        assert_eq!(sync.kind(), ErrorKind::SyncFailure);
        assert_eq!(sync.code(), "topology_sync_failed");
        assert_eq!(sync.sync_reason(), Some(SyncFailure::LineGeometryRequired));
        assert_eq!(
            TwinError::Duplicate {
                kind: "feature",
                id: "f".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
    }
}
