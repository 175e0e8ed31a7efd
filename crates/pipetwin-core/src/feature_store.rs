//! # Feature Store
//!
//! The narrow contract the engine consumes from the geospatial feature
//! store: point reads, id-set reads, layer listing, geometry and property
//! writes, and a nearest-by-layer proximity query.
//!
//! Features live in the same redb file as the asset graph, so a feature
//! write performed through [`FeatureStore`] inside a unit of work commits or
//! rolls back together with the graph sync it triggers.

use crate::geometry::{Geometry, min_distance_meters, round_centimeters};
use crate::storage::{TwinRead, TwinReadExt, TwinWrite, TwinWriteExt, tables};
use crate::types::{Feature, NearbyFeature, Properties};
use crate::TwinError;

/// Read side of the feature store.
pub trait FeatureReader {
    fn get_feature(&self, id: &str) -> Result<Option<Feature>, TwinError>;

    /// Features whose id is in `ids`, in the order of `ids`. Unknown ids are
    /// skipped.
    fn features_within(&self, ids: &[String]) -> Result<Vec<Feature>, TwinError>;

    /// All features of a layer, ordered by id.
    fn features_by_layer(&self, layer: &str) -> Result<Vec<Feature>, TwinError>;

    /// Up to `limit` features of `layer` closest to the reference feature,
    /// nearest first, with distances rounded to two decimals. An unknown
    /// reference yields an empty list.
    fn nearest_by_layer(
        &self,
        reference_id: &str,
        layer: &str,
        limit: usize,
    ) -> Result<Vec<NearbyFeature>, TwinError>;
}

/// Write side of the feature store.
pub trait FeatureStore: FeatureReader {
    /// Insert a new feature. Fails with `Duplicate` when the id exists.
    fn insert_feature(&self, feature: &Feature) -> Result<(), TwinError>;

    /// Replace a feature's geometry. Returns `false` when the id is unknown.
    fn set_geometry(&self, id: &str, geometry: Geometry) -> Result<bool, TwinError>;

    /// Replace a feature's properties, and its visibility when given.
    /// Returns `false` when the id is unknown.
    fn set_properties(
        &self,
        id: &str,
        properties: Properties,
        visible: Option<bool>,
    ) -> Result<bool, TwinError>;
}

impl<R: TwinRead + ?Sized> FeatureReader for R {
    fn get_feature(&self, id: &str) -> Result<Option<Feature>, TwinError> {
        self.get_as(tables::FEATURES, id)
    }

    fn features_within(&self, ids: &[String]) -> Result<Vec<Feature>, TwinError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(feature) = self.get_feature(id)? {
                out.push(feature);
            }
        }
        Ok(out)
    }

    fn features_by_layer(&self, layer: &str) -> Result<Vec<Feature>, TwinError> {
        let all: Vec<Feature> = self.scan_as(tables::FEATURES, "")?;
        Ok(all.into_iter().filter(|f| f.layer == layer).collect())
    }

    fn nearest_by_layer(
        &self,
        reference_id: &str,
        layer: &str,
        limit: usize,
    ) -> Result<Vec<NearbyFeature>, TwinError> {
        let Some(reference) = self.get_feature(reference_id)? else {
            return Ok(Vec::new());
        };

        let mut ranked: Vec<(f64, Feature)> = self
            .features_by_layer(layer)?
            .into_iter()
            .filter(|f| f.id != reference.id)
            .filter_map(|f| min_distance_meters(&reference.geometry, &f.geometry).map(|d| (d, f)))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(distance, feature)| NearbyFeature {
                name: feature.display_name(),
                id: feature.id,
                distance_meters: round_centimeters(distance),
            })
            .collect())
    }
}

impl<W: TwinWrite + ?Sized> FeatureStore for W {
    fn insert_feature(&self, feature: &Feature) -> Result<(), TwinError> {
        feature.geometry.validate()?;
        if self.contains(tables::FEATURES, &feature.id)? {
            return Err(TwinError::Duplicate {
                kind: "feature",
                id: feature.id.clone(),
            });
        }
        self.put_as(tables::FEATURES, &feature.id, feature)
    }

    fn set_geometry(&self, id: &str, geometry: Geometry) -> Result<bool, TwinError> {
        geometry.validate()?;
        let Some(mut feature) = self.get_feature(id)? else {
            return Ok(false);
        };
        feature.geometry = geometry;
        self.put_as(tables::FEATURES, id, &feature)?;
        Ok(true)
    }

    fn set_properties(
        &self,
        id: &str,
        properties: Properties,
        visible: Option<bool>,
    ) -> Result<bool, TwinError> {
        let Some(mut feature) = self.get_feature(id)? else {
            return Ok(false);
        };
        feature.properties = properties;
        if let Some(visible) = visible {
            feature.visible = visible;
        }
        self.put_as(tables::FEATURES, id, &feature)?;
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::TwinStore;

    fn point(id: &str, layer: &str, lon: f64, lat: f64) -> Feature {
        Feature::new(
            id,
            layer,
            Geometry::Point {
                coordinates: vec![lon, lat],
            },
        )
    }

    #[test]
    fn insert_rejects_duplicates() {
        let store = TwinStore::in_memory().expect("open");
        store
            .write(|uow| uow.insert_feature(&point("a", "buildings", 0.0, 0.0)))
            .expect("insert");
        let again = store.write(|uow| uow.insert_feature(&point("a", "buildings", 1.0, 1.0)));
        assert!(matches!(again, Err(TwinError::Duplicate { .. })));
    }

    #[test]
    fn set_geometry_on_unknown_feature_is_false() {
        let store = TwinStore::in_memory().expect("open");
        let updated = store
            .write(|uow| {
                uow.set_geometry(
                    "missing",
                    Geometry::Point {
                        coordinates: vec![0.0, 0.0],
                    },
                )
            })
            .expect("write");
        assert!(!updated);
    }

    #[test]
    fn set_properties_keeps_visibility_when_omitted() {
        let store = TwinStore::in_memory().expect("open");
        store
            .write(|uow| {
                let mut f = point("a", "roads", 0.0, 0.0);
                f.visible = false;
                uow.insert_feature(&f)?;
                uow.set_properties("a", Properties::new().with("k", 1), None)
            })
            .expect("write");
        let feature = store.read(|s| s.get_feature("a")).expect("read").expect("feature");
        assert!(!feature.visible);
        assert_eq!(feature.properties.text("k").as_deref(), Some("1"));
    }

    #[test]
    fn nearest_by_layer_orders_by_distance_and_limits() {
        let store = TwinStore::in_memory().expect("open");
        store
            .write(|uow| {
                uow.insert_feature(&point("pipe", "roads", 0.0, 0.0))?;
                uow.insert_feature(
                    &point("far", "buildings", 0.0, 0.01)
                        .with_properties(Properties::new().with("name", "Far Hall")),
                )?;
                uow.insert_feature(&point("near", "buildings", 0.0, 0.001))?;
                uow.insert_feature(&point("mid", "buildings", 0.0, 0.005))?;
                uow.insert_feature(&point("other", "roads", 0.0, 0.0001))
            })
            .expect("seed");

        let nearest = store
            .read(|s| s.nearest_by_layer("pipe", "buildings", 2))
            .expect("query");
        let ids: Vec<&str> = nearest.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert_eq!(nearest[0].name, "near");

        let all = store
            .read(|s| s.nearest_by_layer("pipe", "buildings", 5))
            .expect("query");
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].name, "Far Hall");

        let none = store
            .read(|s| s.nearest_by_layer("missing", "buildings", 5))
            .expect("query");
        assert!(none.is_empty());
    }
}
