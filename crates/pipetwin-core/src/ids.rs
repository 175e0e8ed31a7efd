//! # Content-Addressed Ids
//!
//! Auto-derived junction and segment ids are a BLAKE3 digest of their
//! canonical source, truncated to [`ID_DIGEST_LEN`] hex characters and
//! prefixed by kind. Re-deriving from the same input always yields the same
//! id, which makes every synchronizer upsert idempotent.

use crate::geometry::Coord;
use crate::primitives::{ID_DIGEST_LEN, NODE_ID_PREFIX, SEGMENT_ID_PREFIX};

fn digest(input: &str) -> String {
    blake3::hash(input.as_bytes())
        .to_hex()
        .chars()
        .take(ID_DIGEST_LEN)
        .collect()
}

/// Id of the junction node at a line endpoint.
#[must_use]
pub fn node_id(coord: &Coord) -> String {
    format!("{NODE_ID_PREFIX}{}", digest(&coord.canonical_key()))
}

/// Id of the segment backed by a pipe feature.
#[must_use]
pub fn segment_id(feature_id: &str) -> String {
    format!("{SEGMENT_ID_PREFIX}{}", digest(feature_id))
}
