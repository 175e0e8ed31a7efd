//! # Mutation Engine
//!
//! The write entry points for pipe features. Each call is one unit of work:
//!
//! 1. Snapshot the feature (`before`)
//! 2. Apply the feature write
//! 3. Run the topology synchronizer
//! 4. Snapshot again (`after`) and append one audit entry
//!
//! If any step fails the whole unit of work is rolled back, so the feature
//! store never holds a geometry whose segment could not be derived.

use crate::audit;
use crate::feature_store::{FeatureReader, FeatureStore};
use crate::geometry::Geometry;
use crate::primitives::PIPE_LAYER;
use crate::storage::{TwinRead, TwinReadExt, TwinStore, tables};
use crate::topology::{SyncReport, TopologySynchronizer};
use crate::types::{AuditAction, Feature, PipeSegment, Properties, SyncFailure};
use crate::TwinError;
use serde::Serialize;

/// Receipt of a successful pipe write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationReceipt {
    pub ok: bool,
    /// The pipe feature id the write landed on.
    pub id: String,
    pub action: AuditAction,
    pub segment_id: String,
    pub audit_id: String,
}

/// The MutationEngine applies feature writes together with their graph sync.
pub struct MutationEngine;

impl MutationEngine {
    /// Resolve a caller-supplied id to a pipe feature id. The id may name a
    /// pipe-layer feature directly or a segment backed by one.
    pub fn resolve_pipe_feature_id<R: TwinRead + ?Sized>(
        reader: &R,
        id: &str,
    ) -> Result<String, TwinError> {
        if let Some(feature) = reader.get_feature(id)? {
            if feature.layer == PIPE_LAYER {
                return Ok(feature.id);
            }
        }
        if let Some(segment) = reader.get_as::<PipeSegment>(tables::SEGMENTS, id)? {
            if let Some(feature) = reader.get_feature(&segment.feature_id)? {
                if feature.layer == PIPE_LAYER {
                    return Ok(feature.id);
                }
            }
        }
        Err(TwinError::FeatureNotFound(id.to_string()))
    }

    /// Replace a pipe's geometry and resynchronize its junctions and segment.
    ///
    /// # Errors
    /// - `IdRequired` for a blank id
    /// - `InvalidGeometry` before any write is attempted
    /// - `FeatureNotFound` when the id resolves to no pipe feature
    /// - `TopologySyncFailed` when the new geometry is not a single line
    pub fn update_geometry(
        store: &TwinStore,
        id: &str,
        geometry: Geometry,
        updated_by: Option<&str>,
    ) -> Result<MutationReceipt, TwinError> {
        let id = require_id(id)?;
        geometry.validate()?;

        store.write(|uow| {
            let feature_id = Self::resolve_pipe_feature_id(uow, id)?;
            let before = Self::snapshot(uow, &feature_id)?;
            if !uow.set_geometry(&feature_id, geometry)? {
                return Err(TwinError::FeatureNotFound(feature_id));
            }
            let report = TopologySynchronizer::sync_geometry(uow, &feature_id).map_err(|e| {
                sync_error(&feature_id, e, |feature_id, reason| TwinError::TopologySyncFailed {
                    feature_id,
                    reason,
                })
            })?;
            let after = Self::snapshot(uow, &feature_id)?;
            let entry = audit::append(
                uow,
                &feature_id,
                AuditAction::GeometryUpdate,
                updated_by,
                before.snapshot(),
                after.snapshot(),
            )?;
            Ok(receipt(feature_id, AuditAction::GeometryUpdate, report, entry.id))
        })
    }

    /// Replace a pipe's properties (and visibility when given) and propagate
    /// the derived attributes into its segment.
    ///
    /// # Errors
    /// - `IdRequired` for a blank id
    /// - `FeatureNotFound` when the id resolves to no pipe feature
    /// - `SegmentSyncFailed` when the segment cannot be updated
    pub fn update_properties(
        store: &TwinStore,
        id: &str,
        properties: Properties,
        visible: Option<bool>,
        updated_by: Option<&str>,
    ) -> Result<MutationReceipt, TwinError> {
        let id = require_id(id)?;

        store.write(|uow| {
            let feature_id = Self::resolve_pipe_feature_id(uow, id)?;
            let before = Self::snapshot(uow, &feature_id)?;
            if !uow.set_properties(&feature_id, properties, visible)? {
                return Err(TwinError::FeatureNotFound(feature_id));
            }
            let report = TopologySynchronizer::sync_properties(uow, &feature_id).map_err(|e| {
                sync_error(&feature_id, e, |feature_id, reason| TwinError::SegmentSyncFailed {
                    feature_id,
                    reason,
                })
            })?;
            let after = Self::snapshot(uow, &feature_id)?;
            let entry = audit::append(
                uow,
                &feature_id,
                AuditAction::PropertiesUpdate,
                updated_by,
                before.snapshot(),
                after.snapshot(),
            )?;
            Ok(receipt(feature_id, AuditAction::PropertiesUpdate, report, entry.id))
        })
    }

    fn snapshot<R: TwinRead + ?Sized>(reader: &R, feature_id: &str) -> Result<Feature, TwinError> {
        reader
            .get_feature(feature_id)?
            .ok_or_else(|| TwinError::FeatureNotFound(feature_id.to_string()))
    }
}

fn require_id(id: &str) -> Result<&str, TwinError> {
    let id = id.trim();
    if id.is_empty() {
        Err(TwinError::IdRequired)
    } else {
        Ok(id)
    }
}

/// Wrap a synchronizer failure with its reason. Storage faults pass through
/// unchanged.
pub(crate) fn sync_error(
    feature_id: &str,
    err: TwinError,
    wrap: impl FnOnce(String, SyncFailure) -> TwinError,
) -> TwinError {
    let reason = match err {
        TwinError::LineGeometryRequired(_) => SyncFailure::LineGeometryRequired,
        TwinError::FeatureNotFound(_) => SyncFailure::FeatureNotFound,
        other => return other,
    };
    tracing::warn!(feature_id, %reason, "pipe write rolled back");
    wrap(feature_id.to_string(), reason)
}

fn receipt(
    feature_id: String,
    action: AuditAction,
    report: SyncReport,
    audit_id: String,
) -> MutationReceipt {
    MutationReceipt {
        ok: true,
        id: feature_id,
        action,
        segment_id: report.segment_id,
        audit_id,
    }
}

// =============================================================================
// TESTS
// =============================================================================
