//! # Relation Lookup
//!
//! Shared by trace and drilldown: find relations touching a candidate set,
//! and resolve the buildings a set of relations points at, falling back to
//! the nearest buildings by geometry when no relation names one.

use crate::fallback::FallbackChain;
use crate::feature_store::FeatureReader;
use crate::primitives::{BUILDING_LAYER, NEAREST_BUILDING_LIMIT};
use crate::storage::{TwinRead, TwinReadExt, tables};
use crate::types::{AssetRelation, Building, LinkedBuilding};
use crate::TwinError;
use indexmap::IndexSet;

/// Relation endpoint type that marks a building.
const BUILDING_TYPE: &str = "building";

/// Relations with either endpoint in `candidates`, ordered by relation id.
pub fn relations_touching(
    reader: &dyn TwinRead,
    candidates: &IndexSet<String>,
) -> Result<Vec<AssetRelation>, TwinError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let all: Vec<AssetRelation> = reader.scan_as(tables::RELATIONS, "")?;
    Ok(all
        .into_iter()
        .filter(|r| candidates.contains(&r.source_id) || candidates.contains(&r.target_id))
        .collect())
}

struct LinkContext<'a> {
    reader: &'a dyn TwinRead,
    relations: &'a [AssetRelation],
    seed_id: &'a str,
}

/// Buildings linked to a neighborhood.
///
/// Tier one: every relation endpoint typed `building`, in relation order,
/// named by the building asset, else the building feature, else the id.
/// Tier two: the five nearest features of the buildings layer to `seed_id`.
pub fn linked_buildings(
    reader: &dyn TwinRead,
    relations: &[AssetRelation],
    seed_id: &str,
) -> Result<Vec<LinkedBuilding>, TwinError> {
    let chain: FallbackChain<LinkContext<'_>, LinkedBuilding> =
        FallbackChain::new("linked_buildings")
            .tier("relation", relation_buildings)
            .tier("nearest", nearest_buildings);
    let ctx = LinkContext {
        reader,
        relations,
        seed_id,
    };
    Ok(chain.resolve(&ctx)?.items)
}

fn relation_buildings(ctx: &LinkContext<'_>) -> Result<Vec<LinkedBuilding>, TwinError> {
    let ids: IndexSet<&str> = ctx
        .relations
        .iter()
        .flat_map(|r| r.endpoints_of_type(BUILDING_TYPE))
        .collect();
    let mut linked = Vec::with_capacity(ids.len());
    for id in ids {
        linked.push(LinkedBuilding {
            id: id.to_string(),
            name: building_name(ctx.reader, id)?,
            distance_meters: None,
        });
    }
    Ok(linked)
}

fn nearest_buildings(ctx: &LinkContext<'_>) -> Result<Vec<LinkedBuilding>, TwinError> {
    Ok(ctx
        .reader
        .nearest_by_layer(ctx.seed_id, BUILDING_LAYER, NEAREST_BUILDING_LIMIT)?
        .into_iter()
        .map(|n| LinkedBuilding {
            id: n.id,
            name: n.name,
            distance_meters: Some(n.distance_meters),
        })
        .collect())
}

fn building_name(reader: &dyn TwinRead, id: &str) -> Result<String, TwinError> {
    if let Some(building) = reader.get_as::<Building>(tables::BUILDINGS, id)? {
        if !building.name.trim().is_empty() {
            return Ok(building.name);
        }
    }
    Ok(reader
        .get_feature(id)?
        .map(|f| f.display_name())
        .unwrap_or_else(|| id.to_string()))
}
