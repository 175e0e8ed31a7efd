//! # Drilldown Aggregator
//!
//! Bounded multi-hop neighborhood of one feature:
//!
//! ```text
//! feature -> segment -> nodes -> relations -> buildings -> rooms
//!                                                       -> valves / equipment
//! ```
//!
//! Each list past the relations is produced by an explicit [`FallbackChain`];
//! when the stored data has nothing to say, the aggregator synthesizes
//! placeholder entries tagged `source = "fallback"` so callers always see
//! which buildings and devices a pipe feeds.

use crate::fallback::FallbackChain;
use crate::feature_store::FeatureReader;
use crate::links::{linked_buildings, relations_touching};
use crate::primitives::{EQUIPMENT_LIMIT, PUMP_STATION_TYPES, ROOM_LIMIT, VALVE_LIMIT};
use crate::storage::{TwinRead, TwinReadExt, key_prefix, tables};
use crate::types::{
    AssetNode, AssetRelation, Equipment, EquipmentEntry, LinkedBuilding, PipeSegment, Room, Valve,
};
use crate::TwinError;
use indexmap::IndexSet;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// Result of `drilldown`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Drilldown {
    pub feature_id: String,
    /// GeoJSON snapshot, or `null` for an unknown feature.
    pub feature: Option<Value>,
    pub segment: Option<PipeSegment>,
    pub nodes: Vec<AssetNode>,
    pub relations: Vec<AssetRelation>,
    pub linked_buildings: Vec<LinkedBuilding>,
    pub impacted_rooms: Vec<Room>,
    pub valves: Vec<Valve>,
    pub equipments: Vec<EquipmentEntry>,
}

/// Shared input of the room, valve and equipment chains.
struct Neighborhood<'a> {
    reader: &'a dyn TwinRead,
    feature_id: &'a str,
    segment_id: Option<String>,
    node_ids: IndexSet<String>,
    linked_buildings: Vec<LinkedBuilding>,
    valves: Vec<Valve>,
}

/// The DrilldownAggregator answers "what is affected if this pipe fails".
pub struct DrilldownAggregator;

impl DrilldownAggregator {
    pub fn drilldown(reader: &dyn TwinRead, feature_id: &str) -> Result<Drilldown, TwinError> {
        let feature = reader.get_feature(feature_id)?;
        let segment = Self::segment_for(reader, feature_id)?;

        let mut candidates: IndexSet<String> = IndexSet::new();
        candidates.insert(feature_id.to_string());
        if let Some(segment) = &segment {
            candidates.insert(segment.id.clone());
            candidates.extend(segment.from_node_id.iter().cloned());
            candidates.extend(segment.to_node_id.iter().cloned());
        }

        let all_nodes: Vec<AssetNode> = reader.scan_as(tables::NODES, "")?;
        let nodes: Vec<AssetNode> = all_nodes
            .into_iter()
            .filter(|n| {
                candidates.contains(&n.id)
                    || n.feature_id.as_ref().is_some_and(|f| candidates.contains(f))
            })
            .collect();
        let node_ids: IndexSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
        candidates.extend(node_ids.iter().cloned());

        let relations = relations_touching(reader, &candidates)?;
        let linked = linked_buildings(reader, &relations, feature_id)?;

        let mut hood = Neighborhood {
            reader,
            feature_id,
            segment_id: segment.as_ref().map(|s| s.id.clone()),
            node_ids,
            linked_buildings: linked,
            valves: Vec::new(),
        };

        let impacted_rooms = Self::room_chain().resolve(&hood)?.items;
        hood.valves = Self::valve_chain().resolve(&hood)?.items;
        let equipments = Self::equipment_chain().resolve(&hood)?.items;

        tracing::debug!(
            feature_id,
            nodes = nodes.len(),
            relations = relations.len(),
            buildings = hood.linked_buildings.len(),
            rooms = impacted_rooms.len(),
            "drilldown complete"
        );

        let Neighborhood {
            linked_buildings,
            valves,
            ..
        } = hood;
        Ok(Drilldown {
            feature_id: feature_id.to_string(),
            feature: feature.map(|f| f.snapshot()),
            segment,
            nodes,
            relations,
            linked_buildings,
            impacted_rooms,
            valves,
            equipments,
        })
    }

    /// The segment backed by `id` as a feature id, else the segment with id `id`.
    fn segment_for(reader: &dyn TwinRead, id: &str) -> Result<Option<PipeSegment>, TwinError> {
        if let Some(segment_id) = reader.get_as::<String>(tables::SEGMENT_BY_FEATURE, id)? {
            if let Some(segment) = reader.get_as(tables::SEGMENTS, &segment_id)? {
                return Ok(Some(segment));
            }
        }
        reader.get_as(tables::SEGMENTS, id)
    }

    // =========================================================================
    // CHAINS
    // =========================================================================

    fn room_chain<'a>() -> FallbackChain<Neighborhood<'a>, Room> {
        FallbackChain::new("rooms")
            .tier("asset", stored_rooms)
            .tier("fallback", fallback_rooms)
    }

    fn valve_chain<'a>() -> FallbackChain<Neighborhood<'a>, Valve> {
        FallbackChain::new("valves")
            .tier("segment", valves_by_segment)
            .tier("feature", valves_by_feature)
            .tier("node", valves_by_node)
    }

    fn equipment_chain<'a>() -> FallbackChain<Neighborhood<'a>, EquipmentEntry> {
        FallbackChain::new("equipments")
            .tier("pump_station", pump_stations)
            .tier("valve", valves_as_equipment)
            .tier("building_device", building_devices)
    }
}

// =============================================================================
// ROOM TIERS
// =============================================================================

fn stored_rooms(hood: &Neighborhood<'_>) -> Result<Vec<Room>, TwinError> {
    let mut rooms = Vec::new();
    for building in &hood.linked_buildings {
        let stored: Vec<Room> = hood
            .reader
            .scan_as(tables::ROOMS, &key_prefix(&[building.id.as_str()]))?;
        rooms.extend(stored);
    }
    rooms.sort_by(room_order);
    rooms.truncate(ROOM_LIMIT);
    Ok(rooms)
}

/// Building, then floor with unknown floors last, then room number.
fn room_order(a: &Room, b: &Room) -> Ordering {
    let floor = match (a.floor, b.floor) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    a.building_id
        .cmp(&b.building_id)
        .then(floor)
        .then_with(|| room_number_order(&a.room_number, &b.room_number))
}

/// Integer room numbers compare numerically and sort before textual ones.
fn room_number_order(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn fallback_rooms(hood: &Neighborhood<'_>) -> Result<Vec<Room>, TwinError> {
    Ok(hood.linked_buildings.iter().map(Room::fallback_for).collect())
}

// =============================================================================
// VALVE TIERS
// =============================================================================

fn valves_where(
    hood: &Neighborhood<'_>,
    keep: impl Fn(&Valve) -> bool,
) -> Result<Vec<Valve>, TwinError> {
    let all: Vec<Valve> = hood.reader.scan_as(tables::VALVES, "")?;
    Ok(all.into_iter().filter(keep).take(VALVE_LIMIT).collect())
}

fn valves_by_segment(hood: &Neighborhood<'_>) -> Result<Vec<Valve>, TwinError> {
    let Some(segment_id) = hood.segment_id.as_deref() else {
        return Ok(Vec::new());
    };
    valves_where(hood, |v| v.segment_id.as_deref() == Some(segment_id))
}

fn valves_by_feature(hood: &Neighborhood<'_>) -> Result<Vec<Valve>, TwinError> {
    valves_where(hood, |v| v.feature_id.as_deref() == Some(hood.feature_id))
}

fn valves_by_node(hood: &Neighborhood<'_>) -> Result<Vec<Valve>, TwinError> {
    if hood.node_ids.is_empty() {
        return Ok(Vec::new());
    }
    valves_where(hood, |v| {
        v.node_id.as_ref().is_some_and(|n| hood.node_ids.contains(n))
    })
}

// =============================================================================
// EQUIPMENT TIERS
// =============================================================================

fn pump_stations(hood: &Neighborhood<'_>) -> Result<Vec<EquipmentEntry>, TwinError> {
    let all: Vec<Equipment> = hood.reader.scan_as(tables::EQUIPMENT, "")?;
    Ok(all
        .iter()
        .filter(|e| {
            PUMP_STATION_TYPES
                .iter()
                .any(|t| e.equipment_type.trim().eq_ignore_ascii_case(t))
        })
        .filter(|e| {
            e.node_id.as_ref().is_some_and(|n| hood.node_ids.contains(n))
                || e.feature_id.as_deref() == Some(hood.feature_id)
        })
        .take(EQUIPMENT_LIMIT)
        .map(EquipmentEntry::from)
        .collect())
}

fn valves_as_equipment(hood: &Neighborhood<'_>) -> Result<Vec<EquipmentEntry>, TwinError> {
    Ok(hood
        .valves
        .iter()
        .take(EQUIPMENT_LIMIT)
        .map(EquipmentEntry::from)
        .collect())
}

fn building_devices(hood: &Neighborhood<'_>) -> Result<Vec<EquipmentEntry>, TwinError> {
    Ok(hood
        .linked_buildings
        .iter()
        .take(EQUIPMENT_LIMIT)
        .map(EquipmentEntry::from)
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================
