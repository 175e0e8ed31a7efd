//! # Engine Primitives
//!
//! Hardcoded runtime constants for the pipetwin engine.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Changing any of the id-derivation constants changes every derived node
//! and segment id, so they are effectively part of the storage format.

// =============================================================================
// LAYERS
// =============================================================================

/// Feature layer holding pipe line geometries.
pub const PIPE_LAYER: &str = "roads";

/// Legacy name for the pipe layer still sent by older clients.
pub const LEGACY_PIPE_LAYER: &str = "pipes";

/// Feature layer holding building footprints.
pub const BUILDING_LAYER: &str = "buildings";

/// Normalize a layer name at the boundary.
///
/// Trims and lowercases the name and remaps the legacy `"pipes"` layer to
/// [`PIPE_LAYER`]. Every other name passes through unchanged.
#[must_use]
pub fn normalize_layer_name(layer: &str) -> String {
    let normalized = layer.trim().to_ascii_lowercase();
    if normalized == LEGACY_PIPE_LAYER {
        PIPE_LAYER.to_string()
    } else {
        normalized
    }
}

// =============================================================================
// ID DERIVATION
// =============================================================================

/// Decimal places kept when canonicalizing a coordinate for node ids.
pub const COORD_DECIMALS: usize = 8;

/// Number of hex characters of the digest kept in derived ids.
pub const ID_DIGEST_LEN: usize = 16;

/// Prefix for auto-derived junction node ids.
pub const NODE_ID_PREFIX: &str = "node_";

/// Prefix for auto-derived segment ids.
pub const SEGMENT_ID_PREFIX: &str = "seg_";

// =============================================================================
// TOPOLOGY DEFAULTS
// =============================================================================

/// Node type assigned to auto-derived endpoints.
pub const JUNCTION_NODE_TYPE: &str = "junction";

/// Segment status when the feature carries none.
pub const DEFAULT_SEGMENT_STATUS: &str = "normal";

/// Actor recorded in the audit log when the caller gives none.
pub const DEFAULT_ACTOR: &str = "system";

/// Node property keys owned by the synchronizer.
pub const NODE_DERIVED_KEYS: &[&str] = &["lon", "lat", "autoSynced"];

/// Feature properties consulted for the segment diameter, in priority order.
pub const DIAMETER_KEYS: &[&str] = &["diameter_mm", "diameter"];

// =============================================================================
// DRILLDOWN BOUNDS
// =============================================================================

/// Maximum buildings returned by the nearest-building fallback.
pub const NEAREST_BUILDING_LIMIT: usize = 5;

/// Maximum rooms returned for the linked buildings.
pub const ROOM_LIMIT: usize = 300;

/// Maximum valves returned by a drilldown.
pub const VALVE_LIMIT: usize = 200;

/// Maximum pump-station records returned by a drilldown.
pub const EQUIPMENT_LIMIT: usize = 100;

/// Equipment types treated as pump stations.
pub const PUMP_STATION_TYPES: &[&str] = &["pump_station", "pump"];

/// Equipment type of building placeholders.
pub const BUILDING_DEVICE_TYPE: &str = "building_device";

/// `source` tag of synthesized rooms and equipment.
pub const FALLBACK_SOURCE: &str = "fallback";

/// `source` tag of stored rooms.
pub const ASSET_SOURCE: &str = "asset";

// =============================================================================
// TELEMETRY DEFAULTS
// =============================================================================

/// Status a sensor point flips to on every ingested sample.
pub const POINT_ONLINE: &str = "online";

/// Sample quality when the caller gives none.
pub const DEFAULT_QUALITY: &str = "good";

/// Sample source when the caller gives none.
pub const DEFAULT_SOURCE: &str = "ingest";

/// Status of every newly created alert.
pub const ALERT_OPEN: &str = "open";

// =============================================================================
// QUERY LIMITS (default, min, max)
// =============================================================================

/// Bounds for `listAuditLog`.
pub const AUDIT_LIMIT: QueryLimit = QueryLimit::new(30, 1, 200);

/// Bounds for `latestTelemetry` and `openAlerts`.
pub const LATEST_LIMIT: QueryLimit = QueryLimit::new(500, 1, 5000);

/// Bounds for `telemetryHistory`.
pub const HISTORY_LIMIT: QueryLimit = QueryLimit::new(1000, 1, 5000);

/// A default plus inclusive clamp range for caller-provided limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimit {
    pub default: usize,
    pub min: usize,
    pub max: usize,
}

impl QueryLimit {
    #[must_use]
    pub const fn new(default: usize, min: usize, max: usize) -> Self {
        Self { default, min, max }
    }

    /// Resolve a requested limit: absent means the default, anything else is
    /// clamped into `[min, max]`.
    #[must_use]
    pub fn resolve(self, requested: Option<i64>) -> usize {
        match requested {
            None => self.default,
            Some(n) if n < self.min as i64 => self.min,
            Some(n) if n > self.max as i64 => self.max,
            Some(n) => n as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_pipe_layer_is_remapped() {
        assert_eq!(normalize_layer_name("pipes"), "roads");
        assert_eq!(normalize_layer_name("  Pipes "), "roads");
        assert_eq!(normalize_layer_name("roads"), "roads");
        assert_eq!(normalize_layer_name("buildings"), "buildings");
        assert_eq!(normalize_layer_name("valves"), "valves");
    }

    #[test]
    fn limits_default_and_clamp() {
        assert_eq!(AUDIT_LIMIT.resolve(None), 30);
        assert_eq!(AUDIT_LIMIT.resolve(Some(0)), 1);
        assert_eq!(AUDIT_LIMIT.resolve(Some(-5)), 1);
        assert_eq!(AUDIT_LIMIT.resolve(Some(999)), 200);
        assert_eq!(LATEST_LIMIT.resolve(Some(42)), 42);
        assert_eq!(HISTORY_LIMIT.resolve(None), 1000);
        assert_eq!(HISTORY_LIMIT.resolve(Some(100_000)), 5000);
    }
}
