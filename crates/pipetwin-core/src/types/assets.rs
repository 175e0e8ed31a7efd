//! Feature, asset-graph and audit records.

use super::{AuditAction, Properties};
use crate::geometry::Geometry;
use crate::primitives::{
    ASSET_SOURCE, BUILDING_DEVICE_TYPE, DEFAULT_SEGMENT_STATUS, FALLBACK_SOURCE,
    normalize_layer_name,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const fn default_visible() -> bool {
    true
}

fn default_segment_status() -> String {
    DEFAULT_SEGMENT_STATUS.to_string()
}

fn default_asset_source() -> String {
    ASSET_SOURCE.to_string()
}

// =============================================================================
// FEATURE
// =============================================================================

/// A geospatial record: geometry plus free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub layer: String,
    #[serde(with = "crate::codec::json_text")]
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl Feature {
    /// Create a visible feature with empty properties. The layer name is
    /// normalized, so the legacy `"pipes"` layer lands in `"roads"`.
    #[must_use]
    pub fn new(id: impl Into<String>, layer: &str, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            layer: normalize_layer_name(layer),
            geometry,
            properties: Properties::new(),
            visible: true,
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Display name: the `name` property, else the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.properties.text("name").unwrap_or_else(|| self.id.clone())
    }

    /// GeoJSON Feature snapshot, with `visible` folded into the properties.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let mut properties = self.properties.as_map().clone();
        properties.insert("visible".to_string(), Value::Bool(self.visible));
        json!({
            "type": "Feature",
            "id": self.id,
            "properties": properties,
            "geometry": self.geometry.to_value(),
        })
    }
}

/// A feature of some layer ranked by distance from a reference feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyFeature {
    pub id: String,
    pub name: String,
    pub distance_meters: f64,
}

// =============================================================================
// TOPOLOGY
// =============================================================================

/// A junction or endpoint in the pipe graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetNode {
    pub id: String,
    #[serde(default)]
    pub feature_id: Option<String>,
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

/// A directed pipe edge, backed one-to-one by a pipe-layer feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeSegment {
    pub id: String,
    pub feature_id: String,
    #[serde(default)]
    pub from_node_id: Option<String>,
    #[serde(default)]
    pub to_node_id: Option<String>,
    #[serde(default)]
    pub diameter_mm: Option<f64>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default = "default_segment_status")]
    pub status: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Generic typed edge between any two assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRelation {
    pub id: String,
    pub source_id: String,
    pub source_type: String,
    pub target_id: String,
    pub target_type: String,
    pub relation_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl AssetRelation {
    #[must_use]
    pub fn touches(&self, id: &str) -> bool {
        self.source_id == id || self.target_id == id
    }

    /// Endpoint ids typed `kind`, compared case-insensitively.
    pub fn endpoints_of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        [
            (&self.source_type, &self.source_id),
            (&self.target_type, &self.target_id),
        ]
        .into_iter()
        .filter(move |(t, _)| t.trim().eq_ignore_ascii_case(kind))
        .map(|(_, id)| id.as_str())
    }
}

// =============================================================================
// REFERENCE ASSETS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valve {
    pub id: String,
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub segment_id: Option<String>,
    #[serde(default)]
    pub valve_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub control_mode: String,
    #[serde(default)]
    pub normal_state: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub id: String,
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
}

/// A room inside exactly one building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub building_id: String,
    #[serde(default)]
    pub floor: Option<i32>,
    #[serde(default)]
    pub room_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_asset_source")]
    pub source: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Room {
    /// Placeholder room standing in for a building with no room records.
    #[must_use]
    pub fn fallback_for(building: &LinkedBuilding) -> Self {
        Self {
            id: format!("{}#fallback-room", building.id),
            building_id: building.id.clone(),
            floor: None,
            room_number: String::new(),
            name: building.name.clone(),
            source: FALLBACK_SOURCE.to_string(),
            properties: Properties::new(),
        }
    }
}

/// Equipment attached to a node or a feature, e.g. a pump station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: String,
    pub equipment_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub properties: Properties,
}

// =============================================================================
// DRILLDOWN VIEWS
// =============================================================================

/// A building linked to a feature, either by relation or by proximity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedBuilding {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

/// One entry of the drilldown equipment list, whatever tier produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentEntry {
    pub id: String,
    pub equipment_type: String,
    pub name: String,
    pub status: String,
    pub node_id: Option<String>,
    pub feature_id: Option<String>,
    /// `"asset"`, `"valve"` or `"fallback"`.
    pub source: String,
}

impl From<&Equipment> for EquipmentEntry {
    fn from(e: &Equipment) -> Self {
        Self {
            id: e.id.clone(),
            equipment_type: e.equipment_type.clone(),
            name: if e.name.is_empty() {
                e.id.clone()
            } else {
                e.name.clone()
            },
            status: e.status.clone(),
            node_id: e.node_id.clone(),
            feature_id: e.feature_id.clone(),
            source: ASSET_SOURCE.to_string(),
        }
    }
}

impl From<&Valve> for EquipmentEntry {
    fn from(v: &Valve) -> Self {
        Self {
            id: v.id.clone(),
            equipment_type: "valve".to_string(),
            name: v.properties.text("name").unwrap_or_else(|| v.id.clone()),
            status: v.status.clone(),
            node_id: v.node_id.clone(),
            feature_id: v.feature_id.clone(),
            source: "valve".to_string(),
        }
    }
}

impl From<&LinkedBuilding> for EquipmentEntry {
    fn from(b: &LinkedBuilding) -> Self {
        Self {
            id: format!("{}#device", b.id),
            equipment_type: BUILDING_DEVICE_TYPE.to_string(),
            name: b.name.clone(),
            status: String::new(),
            node_id: None,
            feature_id: Some(b.id.clone()),
            source: FALLBACK_SOURCE.to_string(),
        }
    }
}

// =============================================================================
// AUDIT
// =============================================================================

/// Before/after record of one topology-affecting write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub feature_id: String,
    pub action: AuditAction,
    pub changed_by: String,
    #[serde(with = "crate::codec::json_text")]
    pub before: Value,
    #[serde(with = "crate::codec::json_text")]
    pub after: Value,
    pub changed_at: DateTime<Utc>,
}
