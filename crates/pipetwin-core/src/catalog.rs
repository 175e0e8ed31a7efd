//! # Catalog Loader
//!
//! Bulk seeding of features and reference assets from one JSON document:
//!
//! ```json
//! {
//!   "features":  [{ "id": "road-1", "layer": "roads", "geometry": {...}, "properties": {...} }],
//!   "buildings": [{ "id": "b1", "name": "Block A" }],
//!   "rooms":     [{ "id": "101", "buildingId": "b1", "floor": 1, "roomNumber": "101" }],
//!   "equipment": [{ "id": "p1", "equipmentType": "pump_station", "nodeId": "node_..." }],
//!   "valves":    [{ "id": "v1", "segmentId": "seg_..." }],
//!   "relations": [{ "id": "r1", "sourceId": "...", "sourceType": "segment", ... }],
//!   "syncPipes": true
//! }
//! ```
//!
//! Everything lands in one unit of work. A duplicate id or an invalid
//! geometry rejects the whole document.

use crate::feature_store::{FeatureReader, FeatureStore};
use crate::geometry::Geometry;
use crate::mutation::sync_error;
use crate::primitives::PIPE_LAYER;
use crate::storage::{RecordTable, TwinReadExt, TwinStore, TwinWrite, TwinWriteExt, composite_key, tables};
use crate::topology::TopologySynchronizer;
use crate::types::{AssetRelation, Building, Equipment, Feature, Properties, Room, Valve};
use crate::TwinError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const fn default_visible() -> bool {
    true
}

/// A feature as written in a catalog. The geometry is validated on seed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFeature {
    pub id: String,
    pub layer: String,
    pub geometry: Value,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

/// A seed document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub features: Vec<CatalogFeature>,
    #[serde(default)]
    pub buildings: Vec<Building>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
    #[serde(default)]
    pub valves: Vec<Valve>,
    #[serde(default)]
    pub relations: Vec<AssetRelation>,
    /// Derive junctions and segments for every pipe-layer feature after
    /// inserting.
    #[serde(default)]
    pub sync_pipes: bool,
}

/// Counts written by `seed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub features: usize,
    pub buildings: usize,
    pub rooms: usize,
    pub equipment: usize,
    pub valves: usize,
    pub relations: usize,
    pub synced_segments: usize,
}

impl Catalog {
    /// Parse a catalog document.
    pub fn from_json(text: &str) -> Result<Self, TwinError> {
        serde_json::from_str(text).map_err(|e| TwinError::InvalidCatalog(e.to_string()))
    }

    /// Write the whole catalog in one unit of work.
    pub fn seed(&self, store: &TwinStore) -> Result<SeedReport, TwinError> {
        let features = self
            .features
            .iter()
            .map(CatalogFeature::to_feature)
            .collect::<Result<Vec<_>, _>>()?;

        let report = store.write(|uow| {
            for feature in &features {
                uow.insert_feature(feature)?;
            }
            insert_all(uow, tables::BUILDINGS, "building", &self.buildings, |b| b.id.clone())?;
            insert_all(uow, tables::ROOMS, "room", &self.rooms, |r| {
                composite_key(&[r.building_id.as_str(), r.id.as_str()])
            })?;
            insert_all(uow, tables::EQUIPMENT, "equipment", &self.equipment, |e| e.id.clone())?;
            insert_all(uow, tables::VALVES, "valve", &self.valves, |v| v.id.clone())?;
            insert_all(uow, tables::RELATIONS, "relation", &self.relations, |r| r.id.clone())?;

            let mut synced_segments = 0;
            if self.sync_pipes {
                for feature in uow.features_by_layer(PIPE_LAYER)? {
                    TopologySynchronizer::sync_geometry(uow, &feature.id).map_err(|e| {
                        sync_error(&feature.id, e, |feature_id, reason| {
                            TwinError::TopologySyncFailed { feature_id, reason }
                        })
                    })?;
                    synced_segments += 1;
                }
            }

            Ok(SeedReport {
                features: features.len(),
                buildings: self.buildings.len(),
                rooms: self.rooms.len(),
                equipment: self.equipment.len(),
                valves: self.valves.len(),
                relations: self.relations.len(),
                synced_segments,
            })
        })?;

        tracing::info!(
            features = report.features,
            buildings = report.buildings,
            rooms = report.rooms,
            synced_segments = report.synced_segments,
            "catalog seeded"
        );
        Ok(report)
    }
}

impl CatalogFeature {
    fn to_feature(&self) -> Result<Feature, TwinError> {
        if self.id.trim().is_empty() {
            return Err(TwinError::IdRequired);
        }
        let geometry = Geometry::from_value(self.geometry.clone())?;
        let mut feature =
            Feature::new(self.id.trim(), &self.layer, geometry).with_properties(self.properties.clone());
        feature.visible = self.visible;
        Ok(feature)
    }
}

fn insert_all<W, T>(
    uow: &W,
    table: RecordTable,
    kind: &'static str,
    records: &[T],
    key: impl Fn(&T) -> String,
) -> Result<(), TwinError>
where
    W: TwinWrite + ?Sized,
    T: Serialize,
{
    for record in records {
        let key = key(record);
        if key.trim().is_empty() {
            return Err(TwinError::IdRequired);
        }
        if uow.contains(table, &key)? {
            return Err(TwinError::Duplicate { kind, id: key });
        }
        uow.put_as(table, &key, record)?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ids::segment_id;
    use crate::types::PipeSegment;

    const DOC: &str = r#"{
        "features": [
            { "id": "road-1", "layer": "pipes",
              "geometry": { "type": "LineString", "coordinates": [[0, 0], [0.001, 0]] },
              "properties": { "diameter": "DN150" } },
            { "id": "b1", "layer": "buildings",
              "geometry": { "type": "Point", "coordinates": [0.0005, 0.0002] },
              "properties": { "name": "Block A" } }
        ],
        "buildings": [{ "id": "b1", "name": "Block A" }],
        "rooms": [{ "id": "101", "buildingId": "b1", "floor": 1, "roomNumber": "101", "name": "Lab" }],
        "syncPipes": true
    }"#;

    #[test]
    fn seeds_and_syncs_pipes() {
        let store = TwinStore::in_memory().expect("open");
        let catalog = Catalog::from_json(DOC).expect("parse");
        let report = catalog.seed(&store).expect("seed");
        assert_eq!(report.features, 2);
        assert_eq!(report.rooms, 1);
        assert_eq!(report.synced_segments, 1);

        let segment: PipeSegment = store
            .read(|s| s.get_as(tables::SEGMENTS, &segment_id("road-1")))
            .expect("read")
            .expect("segment");
        assert_eq!(segment.diameter_mm, Some(150.0));
        let room: Room = store
            .read(|s| s.get_as(tables::ROOMS, &composite_key(&["b1", "101"])))
            .expect("read")
            .expect("room");
        assert_eq!(room.source, "asset");
    }

    #[test]
    fn duplicate_rejects_whole_document() {
        let store = TwinStore::in_memory().expect("open");
        Catalog::from_json(DOC).expect("parse").seed(&store).expect("seed");
        let again = Catalog::from_json(DOC).expect("parse").seed(&store);
        assert!(matches!(again, Err(TwinError::Duplicate { kind: "feature", .. })));
        assert_eq!(store.stats().expect("stats").features, 2);
    }

    #[test]
    fn bad_geometry_and_bad_json() {
        let bad_geometry = r#"{ "features": [{ "id": "x", "layer": "roads",
            "geometry": { "type": "LineString", "coordinates": [[0, 0]] } }] }"#;
        let store = TwinStore::in_memory().expect("open");
        let result = Catalog::from_json(bad_geometry).expect("parse").seed(&store);
        assert!(matches!(result, Err(TwinError::InvalidGeometry(_))));

        assert!(matches!(Catalog::from_json("[1, 2]"), Err(TwinError::InvalidCatalog(_))));
    }
}
