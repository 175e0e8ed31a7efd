//! # Scenario Tier Tests (T0-T4)
//!
//! End-to-end behavior through the public [`TwinEngine`] surface.
//! If ANY tier fails, the engine is INVALID.
//!
//! ## Tiers
//! - T0: Topology Synchronization
//! - T1: Trace Reachability
//! - T2: Drilldown Fallbacks
//! - T3: Telemetry & Alerting
//! - T4: Atomic Writes

use pipetwin_core::{Catalog, ErrorKind, Metric, Severity, SyncFailure, TelemetrySample, ThresholdBounds, TwinEngine, TwinError};
use serde_json::{Value, json};

fn pipe(id: &str, coordinates: Value) -> Value {
    json!({
        "id": id,
        "layer": "roads",
        "geometry": { "type": "LineString", "coordinates": coordinates },
        "properties": { "name": id, "diameter": "DN200", "material": "PE" }
    })
}

/// A -road-1-> B -road-2-> C, with road-3 closing C back to A.
fn network(with_loop: bool) -> TwinEngine {
    let mut features = vec![
        pipe("road-1", json!([[0.0, 0.0], [0.001, 0.0]])),
        pipe("road-2", json!([[0.001, 0.0], [0.002, 0.0]])),
    ];
    if with_loop {
        features.push(pipe("road-3", json!([[0.002, 0.0], [0.0, 0.0]])));
    }
    let catalog: Catalog = serde_json::from_value(json!({
        "features": features,
        "syncPipes": true
    }))
    .expect("catalog");

    let engine = TwinEngine::in_memory().expect("engine");
    engine.seed_catalog(&catalog).expect("seed");
    engine
}

// =============================================================================
// TIER T0: TOPOLOGY SYNCHRONIZATION
// =============================================================================

mod t0_topology_sync {
    use super::*;

    /// T0.1: Syncing an unchanged feature twice changes nothing.
    #[test]
    fn sync_is_idempotent() {
        let engine = network(false);
        let first = engine.sync_geometry("road-1").expect("sync");
        let before = engine.stats().expect("stats");
        let second = engine.sync_geometry("road-1").expect("sync");
        let after = engine.stats().expect("stats");

        assert_eq!(first.segment_id, second.segment_id);
        assert_eq!(first.from_node_id, second.from_node_id);
        assert_eq!(first.to_node_id, second.to_node_id);
        assert!(!second.created);
        assert_eq!(before, after);
    }

    /// T0.2: Pipes sharing an endpoint share one junction.
    #[test]
    fn shared_endpoint_is_one_node() {
        let engine = network(false);
        let a = engine.sync_geometry("road-1").expect("sync");
        let b = engine.sync_geometry("road-2").expect("sync");
        assert_eq!(a.to_node_id, b.from_node_id);
        assert_eq!(engine.stats().expect("stats").nodes, 3);
        assert_eq!(engine.stats().expect("stats").segments, 2);
    }

    /// T0.3: A multi-line that chains into one line syncs from its merged ends.
    #[test]
    fn multi_line_merges_reversed_parts() {
        let engine = network(false);
        let receipt = engine
            .update_pipe_geometry(
                "road-1",
                json!({
                    "type": "MultiLineString",
                    "coordinates": [
                        [[0.0, 0.0], [0.0005, 0.0]],
                        [[0.001, 0.0], [0.0005, 0.0]]
                    ]
                }),
                Some("gis-team"),
            )
            .expect("update");

        let direct = engine.sync_geometry("road-1").expect("sync");
        assert_eq!(receipt.segment_id, direct.segment_id);
        let downstream = engine.trace("road-1", Some("down")).expect("trace");
        assert_eq!(downstream.path_feature_ids, vec!["road-1", "road-2"]);
    }

    /// T0.4: Property edits reach the segment without moving its nodes.
    #[test]
    fn property_update_keeps_nodes() {
        let engine = network(false);
        let before = engine.drilldown("road-1").expect("drilldown");
        engine
            .update_pipe_properties(
                "road-1",
                serde_json::from_value(json!({ "diameter_mm": "300", "status": "maintenance" }))
                    .expect("properties"),
                None,
                None,
            )
            .expect("update");
        let after = engine.drilldown("road-1").expect("drilldown");

        let (old, new) = (before.segment.expect("segment"), after.segment.expect("segment"));
        assert_eq!(old.from_node_id, new.from_node_id);
        assert_eq!(old.to_node_id, new.to_node_id);
        assert_eq!(new.diameter_mm, Some(300.0));
        assert_eq!(new.material.as_deref(), Some("PE"));
        assert_eq!(new.status, "maintenance");
    }
}

// =============================================================================
// TIER T1: TRACE REACHABILITY
// =============================================================================

mod t1_trace {
    use super::*;

    /// T1.1: Downstream and upstream follow edge direction.
    #[test]
    fn trace_is_directional() {
        let engine = network(false);
        let down = engine.trace("road-1", Some("down")).expect("trace");
        assert_eq!(down.path_feature_ids, vec!["road-1", "road-2"]);
        assert_eq!(down.node_ids.len(), 3);

        let up = engine.trace("road-1", Some("UP")).expect("trace");
        assert_eq!(up.path_feature_ids, vec!["road-1"]);

        let up_from_end = engine.trace("road-2", Some("up")).expect("trace");
        assert_eq!(up_from_end.path_feature_ids, vec!["road-2", "road-1"]);
    }

    /// T1.2: A loop terminates and reports each segment once.
    #[test]
    fn cycles_terminate() {
        let engine = network(true);
        let down = engine.trace("road-2", None).expect("trace");
        assert_eq!(down.path_feature_ids, vec!["road-2", "road-3", "road-1"]);
        assert_eq!(down.path_segment_ids.len(), 3);
    }

    /// T1.3: Unknown start is an empty trace, not an error.
    #[test]
    fn unknown_start_is_empty() {
        let engine = network(false);
        let trace = engine.trace("nowhere", None).expect("trace");
        assert!(trace.path_segment_ids.is_empty());
        assert!(trace.node_ids.is_empty());
        assert!(trace.linked_buildings.is_empty());
    }
}

// =============================================================================
// TIER T2: DRILLDOWN FALLBACKS
// =============================================================================

mod t2_drilldown {
    use super::*;

    /// T2.1: Nearby buildings without rooms produce tagged fallback rooms.
    #[test]
    fn nearest_building_gets_fallback_room() {
        let catalog: Catalog = serde_json::from_value(json!({
            "features": [
                pipe("road-1", json!([[0.0, 0.0], [0.001, 0.0]])),
                {
                    "id": "b1",
                    "layer": "buildings",
                    "geometry": { "type": "Point", "coordinates": [0.0005, 0.0001] },
                    "properties": { "name": "Block A" }
                }
            ],
            "syncPipes": true
        }))
        .expect("catalog");
        let engine = TwinEngine::in_memory().expect("engine");
        engine.seed_catalog(&catalog).expect("seed");

        let view = engine.drilldown("road-1").expect("drilldown");
        assert!(view.feature.is_some());
        assert_eq!(view.linked_buildings.len(), 1);
        assert_eq!(view.linked_buildings[0].name, "Block A");
        assert!(view.linked_buildings[0].distance_meters.is_some());
        assert_eq!(view.impacted_rooms.len(), 1);
        assert_eq!(view.impacted_rooms[0].source, "fallback");
        assert_eq!(view.equipments[0].equipment_type, "building_device");
    }

    /// T2.2: Drilldown JSON uses the documented field names.
    #[test]
    fn drilldown_json_shape() {
        let engine = network(false);
        let value = serde_json::to_value(engine.drilldown("road-1").expect("drilldown")).expect("json");
        for key in [
            "featureId",
            "feature",
            "segment",
            "nodes",
            "relations",
            "linkedBuildings",
            "impactedRooms",
            "valves",
            "equipments",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["segment"]["properties"]["syncSource"], "geometry_update");
    }
}

// =============================================================================
// TIER T3: TELEMETRY & ALERTING
// =============================================================================

mod t3_telemetry {
    use super::*;

    /// T3.1: Alarm bounds outrank warning bounds.
    #[test]
    fn threshold_priority() {
        let engine = TwinEngine::in_memory().expect("engine");
        engine
            .upsert_threshold(
                "P9",
                "pressure",
                ThresholdBounds {
                    alarm_high: Some(100.0),
                    warn_high: Some(80.0),
                    ..ThresholdBounds::default()
                },
                None,
            )
            .expect("rule");
        let outcome = engine
            .ingest_telemetry(&TelemetrySample::new("P9", "pressure", 120.0))
            .expect("ingest");
        assert_eq!(outcome.severity, Some(Severity::Critical));
        assert_eq!(outcome.threshold_value, Some(100.0));
    }

    /// T3.2: A sample raises at most one alert.
    #[test]
    fn at_most_one_alert_per_sample() {
        let engine = TwinEngine::in_memory().expect("engine");
        engine
            .upsert_threshold(
                "P9",
                "flow",
                ThresholdBounds {
                    alarm_low: Some(10.0),
                    warn_low: Some(20.0),
                    alarm_high: Some(5.0),
                    warn_high: Some(1.0),
                },
                None,
            )
            .expect("rule");
        engine
            .ingest_telemetry(&TelemetrySample::new("P9", "flow", 7.0))
            .expect("ingest");
        assert_eq!(engine.open_alerts(None, None).expect("alerts").len(), 1);
    }

    /// T3.3: End to end: low pressure on P1 raises a critical alert.
    #[test]
    fn low_pressure_end_to_end() {
        let engine = TwinEngine::in_memory().expect("engine");
        engine
            .upsert_threshold(
                "P1",
                "pressure",
                ThresholdBounds {
                    alarm_low: Some(50.0),
                    ..ThresholdBounds::default()
                },
                Some(true),
            )
            .expect("rule");
        let outcome = engine
            .ingest_telemetry(&TelemetrySample::new("P1", "pressure", 45.0).for_feature("road-1"))
            .expect("ingest");
        assert!(outcome.alert_created);
        assert_eq!(outcome.severity, Some(Severity::Critical));
        assert_eq!(outcome.threshold_value, Some(50.0));

        let latest = engine
            .latest_telemetry(Some(&["P1".to_string()]), Some("pressure"), None)
            .expect("latest");
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].value, 45.0);
        assert_eq!(latest[0].metric, Metric::Pressure);

        let by_feature = engine
            .latest_by_features(&["road-1".to_string()])
            .expect("latest");
        assert_eq!(by_feature.len(), 1);

        let alerts = engine.open_alerts(Some("P1"), None).expect("alerts");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    /// T3.4: Invalid samples are rejected with named errors and write nothing.
    #[test]
    fn invalid_samples_write_nothing() {
        let engine = TwinEngine::in_memory().expect("engine");
        let mut sample = TelemetrySample::new("P1", "pressure", 1.0);
        sample.value = Some(json!(null));
        let err = engine.ingest_telemetry(&sample).expect_err("no value");
        assert!(matches!(err, TwinError::ValueRequired));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(engine.stats().expect("stats").samples, 0);
    }
}

// =============================================================================
// TIER T4: ATOMIC WRITES
// =============================================================================

mod t4_atomic_writes {
    use super::*;

    /// T4.1: A polygon on a pipe fails the sync and leaves the feature as it was.
    #[test]
    fn failed_sync_rolls_back_feature_write() {
        let engine = network(false);
        let before = engine.drilldown("road-1").expect("drilldown").feature;

        let err = engine
            .update_pipe_geometry(
                "road-1",
                json!({
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [0.001, 0.0], [0.001, 0.001], [0.0, 0.0]]]
                }),
                None,
            )
            .expect_err("polygon");
        assert_eq!(err.kind(), ErrorKind::SyncFailure);
        assert_eq!(err.code(), "topology_sync_failed");
        assert_eq!(err.sync_reason(), Some(SyncFailure::LineGeometryRequired));

        let after = engine.drilldown("road-1").expect("drilldown").feature;
        assert_eq!(before, after);
        assert!(engine.list_audit_log("road-1", None).expect("audit").is_empty());
    }

    /// T4.2: Every successful write appends exactly one audit entry.
    #[test]
    fn audit_entry_per_write() {
        let engine = network(false);
        engine
            .update_pipe_geometry("road-2", json!({ "type": "LineString", "coordinates": [[0.001, 0.0], [0.003, 0.0]] }), None)
            .expect("update");
        engine
            .update_pipe_properties("road-2", Default::default(), Some(false), Some("ops"))
            .expect("update");

        let entries = engine.list_audit_log("road-2", None).expect("audit");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].changed_by, "ops");
        assert_eq!(entries[1].changed_by, "system");
        assert_eq!(entries[0].after["properties"]["visible"], false);
    }
}
