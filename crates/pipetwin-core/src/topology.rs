//! # Topology Synchronizer
//!
//! Derives and repairs junction nodes and pipe segments from pipe-layer line
//! features, and keeps segment attributes in step with feature properties.
//!
//! Both entry points run inside the caller's unit of work. They never commit
//! anything themselves: if they fail, the caller's transaction (and the
//! feature write that triggered the sync) is rolled back.
//!
//! ## Idempotence
//!
//! Node ids hash the rounded endpoint coordinate and segment ids hash the
//! feature id, so re-syncing an unchanged feature rewrites identical rows.
//! Upserts only ever merge properties; hand-entered keys survive.

use crate::feature_store::FeatureReader;
use crate::geometry::Coord;
use crate::ids::{node_id, segment_id};
use crate::primitives::{
    DEFAULT_SEGMENT_STATUS, DIAMETER_KEYS, JUNCTION_NODE_TYPE, NODE_DERIVED_KEYS, PIPE_LAYER,
};
use crate::storage::{TwinReadExt, TwinWrite, TwinWriteExt, tables};
use crate::types::{AssetNode, AuditAction, Feature, PipeSegment, Properties};
use crate::TwinError;
use serde::Serialize;
use serde_json::Value;

/// What a sync wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub feature_id: String,
    pub segment_id: String,
    pub from_node_id: Option<String>,
    pub to_node_id: Option<String>,
    /// Whether the segment row was created by this sync.
    pub created: bool,
}

/// Segment attributes derived from feature properties.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentAttributes {
    pub diameter_mm: Option<f64>,
    pub material: Option<String>,
    pub status: String,
}

impl SegmentAttributes {
    /// Derive attributes from a feature's properties.
    ///
    /// - `diameterMm`: first non-empty of `diameter_mm` / `diameter`, with
    ///   every character other than digits and `.` stripped; unparseable
    ///   text yields `None`
    /// - `material`: the `material` property, blank is `None`
    /// - `status`: the `status` property, blank is `"normal"`
    #[must_use]
    pub fn derive(properties: &Properties) -> Self {
        let diameter_mm = DIAMETER_KEYS
            .iter()
            .find_map(|key| properties.text(key))
            .and_then(|raw| {
                let digits: String = raw
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.')
                    .collect();
                digits.parse::<f64>().ok()
            });
        Self {
            diameter_mm,
            material: properties.text("material"),
            status: properties
                .text("status")
                .unwrap_or_else(|| DEFAULT_SEGMENT_STATUS.to_string()),
        }
    }

    /// Overwrite `segment` with every non-null derived value.
    fn apply(self, segment: &mut PipeSegment) {
        if self.diameter_mm.is_some() {
            segment.diameter_mm = self.diameter_mm;
        }
        if self.material.is_some() {
            segment.material = self.material;
        }
        segment.status = self.status;
    }
}

/// The TopologySynchronizer keeps the derived graph consistent with features.
pub struct TopologySynchronizer;

impl TopologySynchronizer {
    /// Recompute the segment of a feature whose geometry was just replaced:
    /// upsert both endpoint junctions and the segment.
    ///
    /// # Errors
    /// - `FeatureNotFound` when no pipe-layer feature has this id
    /// - `LineGeometryRequired` when the geometry does not reduce to one line
    pub fn sync_geometry<W: TwinWrite + ?Sized>(
        uow: &W,
        feature_id: &str,
    ) -> Result<SyncReport, TwinError> {
        let feature = Self::pipe_feature(uow, feature_id)?;
        let line = feature
            .geometry
            .reduce_to_line()
            .ok_or_else(|| TwinError::LineGeometryRequired(feature_id.to_string()))?;
        let (Some(start), Some(end)) = (line.first(), line.last()) else {
            return Err(TwinError::LineGeometryRequired(feature_id.to_string()));
        };

        let from = Self::upsert_junction(uow, start)?;
        let to = Self::upsert_junction(uow, end)?;

        let (mut segment, created) = Self::load_or_new_segment(uow, feature_id)?;
        segment.from_node_id = Some(from);
        segment.to_node_id = Some(to);
        Self::apply_feature(&mut segment, &feature, AuditAction::GeometryUpdate);
        Self::store_segment(uow, &segment)?;

        tracing::debug!(
            feature_id,
            segment_id = %segment.id,
            created,
            "geometry synchronized"
        );
        Ok(Self::report(segment, created))
    }

    /// Propagate a feature's properties into its segment without touching
    /// node ids. A missing segment is created with null endpoints.
    ///
    /// # Errors
    /// - `FeatureNotFound` when no pipe-layer feature has this id
    pub fn sync_properties<W: TwinWrite + ?Sized>(
        uow: &W,
        feature_id: &str,
    ) -> Result<SyncReport, TwinError> {
        let feature = Self::pipe_feature(uow, feature_id)?;
        let (mut segment, created) = Self::load_or_new_segment(uow, feature_id)?;
        Self::apply_feature(&mut segment, &feature, AuditAction::PropertiesUpdate);
        Self::store_segment(uow, &segment)?;

        tracing::debug!(
            feature_id,
            segment_id = %segment.id,
            created,
            "segment attributes synchronized"
        );
        Ok(Self::report(segment, created))
    }

    fn pipe_feature<W: TwinWrite + ?Sized>(uow: &W, feature_id: &str) -> Result<Feature, TwinError> {
        match uow.get_feature(feature_id)? {
            Some(feature) if feature.layer == PIPE_LAYER => Ok(feature),
            _ => Err(TwinError::FeatureNotFound(feature_id.to_string())),
        }
    }

    /// Create the junction at `coord`, or merge the derived keys into the
    /// existing one. Returns the node id.
    fn upsert_junction<W: TwinWrite + ?Sized>(uow: &W, coord: &Coord) -> Result<String, TwinError> {
        let id = node_id(coord);
        let rounded = coord.rounded();
        let derived = Properties::new()
            .with("lon", rounded.lon)
            .with("lat", rounded.lat)
            .with("autoSynced", true);

        let node = match uow.get_as::<AssetNode>(tables::NODES, &id)? {
            Some(mut existing) => {
                existing.properties.merge_derived(&derived, NODE_DERIVED_KEYS);
                existing
            }
            None => AssetNode {
                id: id.clone(),
                feature_id: None,
                node_type: JUNCTION_NODE_TYPE.to_string(),
                name: id.clone(),
                properties: derived,
            },
        };
        uow.put_as(tables::NODES, &id, &node)?;
        Ok(id)
    }

    fn load_or_new_segment<W: TwinWrite + ?Sized>(
        uow: &W,
        feature_id: &str,
    ) -> Result<(PipeSegment, bool), TwinError> {
        let indexed: Option<String> = uow.get_as(tables::SEGMENT_BY_FEATURE, feature_id)?;
        let id = indexed.unwrap_or_else(|| segment_id(feature_id));
        match uow.get_as::<PipeSegment>(tables::SEGMENTS, &id)? {
            Some(segment) => Ok((segment, false)),
            None => Ok((
                PipeSegment {
                    id,
                    feature_id: feature_id.to_string(),
                    from_node_id: None,
                    to_node_id: None,
                    diameter_mm: None,
                    material: None,
                    status: DEFAULT_SEGMENT_STATUS.to_string(),
                    properties: Properties::new(),
                },
                true,
            )),
        }
    }

    fn apply_feature(segment: &mut PipeSegment, feature: &Feature, source: AuditAction) {
        SegmentAttributes::derive(&feature.properties).apply(segment);
        let incoming = feature
            .properties
            .clone()
            .with("autoSynced", true)
            .with("syncSource", Value::from(source.as_str()));
        segment.properties.merge(&incoming);
    }

    fn store_segment<W: TwinWrite + ?Sized>(uow: &W, segment: &PipeSegment) -> Result<(), TwinError> {
        uow.put_as(tables::SEGMENTS, &segment.id, segment)?;
        uow.put_as(tables::SEGMENT_BY_FEATURE, &segment.feature_id, &segment.id)
    }

    fn report(segment: PipeSegment, created: bool) -> SyncReport {
        SyncReport {
            feature_id: segment.feature_id,
            segment_id: segment.id,
            from_node_id: segment.from_node_id,
            to_node_id: segment.to_node_id,
            created,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::feature_store::FeatureStore;
    use crate::geometry::Geometry;
    use crate::storage::TwinStore;
    use serde_json::json;

    fn pipe(id: &str, coords: &[[f64; 2]], props: Properties) -> Feature {
        Feature::new(
            id,
            "roads",
            Geometry::LineString {
                coordinates: coords.iter().map(|c| c.to_vec()).collect(),
            },
        )
        .with_properties(props)
    }

    #[test]
    fn derive_strips_non_numeric_diameter() {
        let attrs = SegmentAttributes::derive(
            &Properties::new()
                .with("diameter", "DN 300mm")
                .with("material", "  ")
                .with("status", ""),
        );
        assert_eq!(attrs.diameter_mm, Some(300.0));
        assert_eq!(attrs.material, None);
        assert_eq!(attrs.status, "normal");
    }

    #[test]
    fn derive_prefers_diameter_mm() {
        let attrs = SegmentAttributes::derive(
            &Properties::new()
                .with("diameter_mm", 150)
                .with("diameter", "DN300")
                .with("material", "PE")
                .with("status", "maintenance"),
        );
        assert_eq!(attrs.diameter_mm, Some(150.0));
        assert_eq!(attrs.material.as_deref(), Some("PE"));
        assert_eq!(attrs.status, "maintenance");
    }

    #[test]
    fn derive_unparseable_diameter_is_none() {
        let attrs = SegmentAttributes::derive(&Properties::new().with("diameter", "1.2.3"));
        assert_eq!(attrs.diameter_mm, None);
    }

    #[test]
    fn sync_geometry_creates_nodes_and_segment() {
        let store = TwinStore::in_memory().expect("open");
        let report = store
            .write(|uow| {
                uow.insert_feature(&pipe(
                    "road-1",
                    &[[0.0, 0.0], [0.001, 0.0]],
                    Properties::new().with("diameter", "DN200"),
                ))?;
                TopologySynchronizer::sync_geometry(uow, "road-1")
            })
            .expect("sync");

        assert!(report.created);
        assert_eq!(report.segment_id, segment_id("road-1"));
        let from = report.from_node_id.clone().expect("from");
        assert_eq!(from, node_id(&Coord::new(0.0, 0.0)));

        let (segment, node) = store
            .read(|s| {
                let seg: PipeSegment = s.get_as(tables::SEGMENTS, &report.segment_id)?.expect("segment");
                let node: AssetNode = s.get_as(tables::NODES, &from)?.expect("node");
                Ok((seg, node))
            })
            .expect("read");
        assert_eq!(segment.diameter_mm, Some(200.0));
        assert_eq!(segment.status, "normal");
        assert_eq!(segment.properties.get("syncSource"), Some(&json!("geometry_update")));
        assert_eq!(node.node_type, "junction");
        assert_eq!(node.name, from);
        assert_eq!(node.properties.get("autoSynced"), Some(&json!(true)));
    }

    #[test]
    fn node_upsert_keeps_hand_entered_properties() {
        let store = TwinStore::in_memory().expect("open");
        let id = node_id(&Coord::new(0.0, 0.0));
        store
            .write(|uow| {
                uow.put_as(
                    tables::NODES,
                    &id,
                    &AssetNode {
                        id: id.clone(),
                        feature_id: None,
                        node_type: "hydrant".into(),
                        name: "H-1".into(),
                        properties: Properties::new().with("note", "inspected"),
                    },
                )?;
                uow.insert_feature(&pipe("road-1", &[[0.0, 0.0], [1.0, 0.0]], Properties::new()))?;
                TopologySynchronizer::sync_geometry(uow, "road-1")
            })
            .expect("sync");

        let node: AssetNode = store
            .read(|s| s.get_as(tables::NODES, &id))
            .expect("read")
            .expect("node");
        assert_eq!(node.node_type, "hydrant");
        assert_eq!(node.name, "H-1");
        assert_eq!(node.properties.get("note"), Some(&json!("inspected")));
        assert_eq!(node.properties.get("autoSynced"), Some(&json!(true)));
    }

    #[test]
    fn non_pipe_layer_is_not_found() {
        let store = TwinStore::in_memory().expect("open");
        let result = store.write(|uow| {
            uow.insert_feature(&Feature::new(
                "b1",
                "buildings",
                Geometry::LineString {
                    coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
                },
            ))?;
            TopologySynchronizer::sync_geometry(uow, "b1")
        });
        assert!(matches!(result, Err(TwinError::FeatureNotFound(_))));
    }

    #[test]
    fn sync_properties_creates_segment_without_nodes() {
        let store = TwinStore::in_memory().expect("open");
        let report = store
            .write(|uow| {
                uow.insert_feature(&pipe(
                    "road-9",
                    &[[0.0, 0.0], [1.0, 0.0]],
                    Properties::new().with("material", "ductile iron"),
                ))?;
                TopologySynchronizer::sync_properties(uow, "road-9")
            })
            .expect("sync");
        assert!(report.created);
        assert_eq!(report.from_node_id, None);
        assert_eq!(report.to_node_id, None);
    }

    #[test]
    fn null_derived_values_do_not_erase_existing_ones() {
        let store = TwinStore::in_memory().expect("open");
        store
            .write(|uow| {
                uow.insert_feature(&pipe(
                    "road-1",
                    &[[0.0, 0.0], [1.0, 0.0]],
                    Properties::new().with("diameter", 300).with("material", "PE"),
                ))?;
                TopologySynchronizer::sync_geometry(uow, "road-1")?;
                uow.set_properties("road-1", Properties::new().with("status", "closed"), None)?;
                TopologySynchronizer::sync_properties(uow, "road-1")
            })
            .expect("sync");
        let segment: PipeSegment = store
            .read(|s| s.get_as(tables::SEGMENTS, &segment_id("road-1")))
            .expect("read")
            .expect("segment");
        assert_eq!(segment.diameter_mm, Some(300.0));
        assert_eq!(segment.material.as_deref(), Some("PE"));
        assert_eq!(segment.status, "closed");
        assert!(segment.from_node_id.is_some());
        assert_eq!(segment.properties.get("syncSource"), Some(&json!("properties_update")));
    }
}
