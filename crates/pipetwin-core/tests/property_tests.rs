//! # Property-Based Tests
//!
//! Determinism and termination invariants checked with proptest.

#![allow(clippy::float_arithmetic)]

use pipetwin_core::ids::{node_id, segment_id};
use pipetwin_core::primitives::{AUDIT_LIMIT, HISTORY_LIMIT, LATEST_LIMIT, QueryLimit};
use pipetwin_core::thresholds::evaluate;
use pipetwin_core::{
    Catalog, Coord, Direction, PipeSegment, Properties, ThresholdBounds, TraceEngine, TwinEngine,
};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

fn segment(index: usize, from: usize, to: usize) -> PipeSegment {
    PipeSegment {
        id: format!("seg-{index}"),
        feature_id: format!("road-{index}"),
        from_node_id: Some(format!("n{from}")),
        to_node_id: Some(format!("n{to}")),
        diameter_mm: None,
        material: None,
        status: "normal".to_string(),
        properties: Properties::default(),
    }
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// The same coordinate always yields the same node id.
    #[test]
    fn node_id_is_deterministic(lon in -180.0f64..180.0, lat in -90.0f64..90.0) {
        let first = node_id(&Coord::new(lon, lat));
        let second = node_id(&Coord::new(lon, lat));
        prop_assert!(first.starts_with("node_"));
        prop_assert_eq!(first, second);
    }

    /// Segment ids depend on the feature id alone.
    #[test]
    fn segment_id_is_deterministic(feature_id in "[a-z0-9-]{1,24}") {
        prop_assert_eq!(segment_id(&feature_id), segment_id(&feature_id));
        prop_assert!(segment_id(&feature_id).starts_with("seg_"));
    }

    /// Re-syncing an unchanged pipe writes nothing new.
    #[test]
    fn sync_is_idempotent(
        points in vec((-10_000i32..10_000, -10_000i32..10_000), 2..6)
    ) {
        let coordinates: Vec<[f64; 2]> = points
            .iter()
            .map(|&(x, y)| [f64::from(x) / 1_000_000.0, f64::from(y) / 1_000_000.0])
            .collect();
        let catalog: Catalog = serde_json::from_value(json!({
            "features": [{
                "id": "road-1",
                "layer": "roads",
                "geometry": { "type": "LineString", "coordinates": coordinates }
            }],
            "syncPipes": true
        }))
        .expect("catalog");
        let engine = TwinEngine::in_memory().expect("engine");
        engine.seed_catalog(&catalog).expect("seed");

        let before = engine.stats().expect("stats");
        let again = engine.sync_geometry("road-1").expect("sync");
        prop_assert!(!again.created);
        prop_assert_eq!(before, engine.stats().expect("stats"));
        prop_assert!(before.nodes == 1 || before.nodes == 2);
    }

    /// Every walk terminates, visits each segment at most once and only
    /// reports segments and nodes of the graph.
    #[test]
    fn walk_terminates_within_graph(
        edges in vec((0usize..6, 0usize..6), 1..20),
        start in 0usize..20,
        upstream in any::<bool>(),
    ) {
        let segments: Vec<PipeSegment> = edges
            .iter()
            .enumerate()
            .map(|(i, &(from, to))| segment(i, from, to))
            .collect();
        let start_id = format!("seg-{}", start % segments.len());
        let direction = if upstream { Direction::Up } else { Direction::Down };

        let path = TraceEngine::walk(&segments, &start_id, direction);

        let known: BTreeSet<&str> = segments.iter().map(|s| s.id.as_str()).collect();
        prop_assert!(!path.segment_ids.is_empty());
        prop_assert!(path.segment_ids.len() <= segments.len());
        prop_assert_eq!(path.segment_ids.first().map(String::as_str), Some(start_id.as_str()));
        for id in &path.segment_ids {
            prop_assert!(known.contains(id.as_str()));
        }
        prop_assert!(path.node_ids.len() <= 6);
        prop_assert_eq!(path.feature_ids.len(), path.segment_ids.len());
    }

    /// Resolved limits always land inside their range.
    #[test]
    fn limits_are_clamped(requested in any::<Option<i64>>()) {
        let limits: [QueryLimit; 3] = [AUDIT_LIMIT, LATEST_LIMIT, HISTORY_LIMIT];
        for limit in limits {
            let resolved = limit.resolve(requested);
            prop_assert!(resolved >= 1);
            prop_assert!(resolved <= 5000);
        }
    }

    /// A rule without bounds never breaches.
    #[test]
    fn empty_bounds_never_breach(value in -1.0e9f64..1.0e9) {
        prop_assert_eq!(evaluate(&ThresholdBounds::default(), value), None);
    }
}
