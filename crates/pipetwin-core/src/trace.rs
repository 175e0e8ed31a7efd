//! # Trace Engine
//!
//! Directional reachability over the segment graph.
//!
//! Downstream follows `a.toNodeId == b.fromNodeId`; upstream follows
//! `a.fromNodeId == b.toNodeId`. The walk is breadth-first with a visited set
//! over segment ids, so it terminates on cycles and reports every reachable
//! segment exactly once, in discovery order.
//!
//! This is pure reachability: no flow direction is inferred from elevation,
//! pressure or valve state.

use crate::links::{linked_buildings, relations_touching};
use crate::storage::{TwinRead, TwinReadExt, tables};
use crate::types::{Direction, LinkedBuilding, PipeSegment};
use crate::TwinError;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::VecDeque;

/// Segments, features and nodes reached from a start segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracePath {
    pub segment_ids: IndexSet<String>,
    pub feature_ids: IndexSet<String>,
    pub node_ids: IndexSet<String>,
}

/// Result of `trace`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub start_id: String,
    pub direction: Direction,
    pub path_segment_ids: Vec<String>,
    pub path_feature_ids: Vec<String>,
    pub node_ids: Vec<String>,
    pub linked_buildings: Vec<LinkedBuilding>,
}

/// The TraceEngine answers "what is upstream/downstream of this pipe".
pub struct TraceEngine;

impl TraceEngine {
    /// Trace from a segment id or a feature id. An unknown start yields an
    /// empty result, not an error.
    pub fn trace(
        reader: &dyn TwinRead,
        start_id: &str,
        direction: Direction,
    ) -> Result<TraceResult, TwinError> {
        let segments: Vec<PipeSegment> = reader.scan_as(tables::SEGMENTS, "")?;
        let path = Self::walk(&segments, start_id, direction);

        let linked = if path.segment_ids.is_empty() {
            Vec::new()
        } else {
            let candidates: IndexSet<String> = path
                .segment_ids
                .iter()
                .chain(&path.feature_ids)
                .chain(&path.node_ids)
                .cloned()
                .collect();
            let relations = relations_touching(reader, &candidates)?;
            linked_buildings(reader, &relations, start_id)?
        };

        tracing::debug!(
            start_id,
            direction = direction.as_str(),
            segments = path.segment_ids.len(),
            "trace complete"
        );

        Ok(TraceResult {
            start_id: start_id.to_string(),
            direction,
            path_segment_ids: path.segment_ids.into_iter().collect(),
            path_feature_ids: path.feature_ids.into_iter().collect(),
            node_ids: path.node_ids.into_iter().collect(),
            linked_buildings: linked,
        })
    }

    /// Breadth-first walk over an in-memory segment list.
    ///
    /// The start is the first segment whose id, else whose feature id,
    /// equals `start_id`.
    #[must_use]
    pub fn walk(segments: &[PipeSegment], start_id: &str, direction: Direction) -> TracePath {
        let mut path = TracePath::default();
        let Some(start) = segments
            .iter()
            .position(|s| s.id == start_id)
            .or_else(|| segments.iter().position(|s| s.feature_id == start_id))
        else {
            return path;
        };

        // Segments keyed by the node a walk must arrive at to enter them.
        let mut entries: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (index, segment) in segments.iter().enumerate() {
            if let Some(node) = Self::entry_node(segment, direction) {
                entries.entry(node).or_default().push(index);
            }
        }

        let mut visited: IndexSet<usize> = IndexSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let segment = &segments[current];
            path.segment_ids.insert(segment.id.clone());
            path.feature_ids.insert(segment.feature_id.clone());
            path.node_ids.extend(segment.from_node_id.iter().cloned());
            path.node_ids.extend(segment.to_node_id.iter().cloned());

            let Some(exit) = Self::exit_node(segment, direction) else {
                continue;
            };
            for &next in entries.get(exit).map(Vec::as_slice).unwrap_or_default() {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        path
    }

    fn entry_node(segment: &PipeSegment, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Down => segment.from_node_id.as_deref(),
            Direction::Up => segment.to_node_id.as_deref(),
        }
    }

    fn exit_node(segment: &PipeSegment, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Down => segment.to_node_id.as_deref(),
            Direction::Up => segment.from_node_id.as_deref(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
