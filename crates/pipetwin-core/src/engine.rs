//! # Twin Engine
//!
//! The single entry point the HTTP and CLI layers call. Owns the store and
//! routes every operation to its engine:
//!
//! - writes (`update_pipe_*`, `ingest_telemetry`, `upsert_threshold`,
//!   `seed_catalog`) each open exactly one unit of work
//! - reads (`trace`, `drilldown`, telemetry and audit queries) each run
//!   against one committed snapshot
//!
//! The engine holds no state besides the store, so it can be shared behind
//! an `Arc` by concurrent request handlers.

use crate::audit::list_audit_log;
use crate::catalog::{Catalog, SeedReport};
use crate::drilldown::{Drilldown, DrilldownAggregator};
use crate::geometry::Geometry;
use crate::ingestor::TelemetryIngestor;
use crate::mutation::{MutationEngine, MutationReceipt};
use crate::storage::{StoreStats, TwinStore};
use crate::telemetry;
use crate::topology::{SyncReport, TopologySynchronizer};
use crate::trace::{TraceEngine, TraceResult};
use crate::types::{
    AlertEvent, AuditLogEntry, Direction, IngestOutcome, MetricLatest, MetricSample, Properties,
    TelemetrySample, ThresholdBounds, ThresholdRule,
};
use crate::TwinError;
use serde_json::Value;
use std::path::Path;

fn required(id: &str) -> Result<&str, TwinError> {
    let id = id.trim();
    if id.is_empty() {
        Err(TwinError::IdRequired)
    } else {
        Ok(id)
    }
}

/// Facade over the twin store and its engines.
#[derive(Debug)]
pub struct TwinEngine {
    store: TwinStore,
}

impl TwinEngine {
    /// Open or create a persistent engine at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TwinError> {
        let path = path.as_ref();
        let store = TwinStore::open(path)?;
        tracing::info!(path = %path.display(), "twin store opened");
        Ok(Self { store })
    }

    /// An engine whose store lives only in memory.
    pub fn in_memory() -> Result<Self, TwinError> {
        Ok(Self {
            store: TwinStore::in_memory()?,
        })
    }

    #[must_use]
    pub fn store(&self) -> &TwinStore {
        &self.store
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !self.store.is_in_memory()
    }

    pub fn stats(&self) -> Result<StoreStats, TwinError> {
        self.store.stats()
    }

    pub fn compact(&mut self) -> Result<(), TwinError> {
        self.store.compact()
    }

    // =========================================================================
    // TOPOLOGY
    // =========================================================================

    /// Resynchronize one pipe feature's junctions and segment from its
    /// current geometry.
    pub fn sync_geometry(&self, feature_id: &str) -> Result<SyncReport, TwinError> {
        let feature_id = required(feature_id)?;
        self.store
            .write(|uow| TopologySynchronizer::sync_geometry(uow, feature_id))
    }

    /// Propagate one pipe feature's properties into its segment.
    pub fn sync_properties(&self, feature_id: &str) -> Result<SyncReport, TwinError> {
        let feature_id = required(feature_id)?;
        self.store
            .write(|uow| TopologySynchronizer::sync_properties(uow, feature_id))
    }

    /// Replace a pipe's geometry. `geometry` is GeoJSON and is validated
    /// before the unit of work opens.
    pub fn update_pipe_geometry(
        &self,
        id: &str,
        geometry: Value,
        updated_by: Option<&str>,
    ) -> Result<MutationReceipt, TwinError> {
        let geometry = Geometry::from_value(geometry)?;
        MutationEngine::update_geometry(&self.store, id, geometry, updated_by)
    }

    /// Replace a pipe's properties, and its visibility when given.
    pub fn update_pipe_properties(
        &self,
        id: &str,
        properties: Properties,
        visible: Option<bool>,
        updated_by: Option<&str>,
    ) -> Result<MutationReceipt, TwinError> {
        MutationEngine::update_properties(&self.store, id, properties, visible, updated_by)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Trace from a segment or feature id. `direction` is `"up"` in any case
    /// for upstream; anything else is downstream.
    pub fn trace(&self, start_id: &str, direction: Option<&str>) -> Result<TraceResult, TwinError> {
        let start_id = required(start_id)?;
        let direction = Direction::parse_lenient(direction);
        self.store
            .read(|snapshot| TraceEngine::trace(snapshot, start_id, direction))
    }

    pub fn drilldown(&self, feature_id: &str) -> Result<Drilldown, TwinError> {
        let feature_id = required(feature_id)?;
        self.store
            .read(|snapshot| DrilldownAggregator::drilldown(snapshot, feature_id))
    }

    pub fn list_audit_log(
        &self,
        feature_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<AuditLogEntry>, TwinError> {
        let feature_id = required(feature_id)?;
        self.store
            .read(|snapshot| list_audit_log(snapshot, feature_id, limit))
    }

    // =========================================================================
    // TELEMETRY
    // =========================================================================

    pub fn ingest_telemetry(&self, sample: &TelemetrySample) -> Result<IngestOutcome, TwinError> {
        TelemetryIngestor::ingest(&self.store, sample)
    }

    /// Ingest samples one at a time. Each sample is its own unit of work, so
    /// one bad sample does not discard the others.
    pub fn ingest_batch(&self, samples: &[TelemetrySample]) -> Vec<Result<IngestOutcome, TwinError>> {
        samples
            .iter()
            .map(|sample| self.ingest_telemetry(sample))
            .collect()
    }

    pub fn upsert_threshold(
        &self,
        point_id: &str,
        metric: &str,
        bounds: ThresholdBounds,
        enabled: Option<bool>,
    ) -> Result<ThresholdRule, TwinError> {
        TelemetryIngestor::upsert_threshold(&self.store, point_id, metric, bounds, enabled)
    }

    pub fn latest_telemetry(
        &self,
        point_ids: Option<&[String]>,
        metric: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MetricLatest>, TwinError> {
        self.store
            .read(|snapshot| telemetry::latest_telemetry(snapshot, point_ids, metric, limit))
    }

    pub fn latest_by_features(&self, feature_ids: &[String]) -> Result<Vec<MetricLatest>, TwinError> {
        self.store
            .read(|snapshot| telemetry::latest_by_features(snapshot, feature_ids))
    }

    pub fn telemetry_history(
        &self,
        point_id: &str,
        metric: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<MetricSample>, TwinError> {
        self.store.read(|snapshot| {
            telemetry::telemetry_history(snapshot, point_id, metric, from, to, limit)
        })
    }

    pub fn open_alerts(
        &self,
        point_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<AlertEvent>, TwinError> {
        self.store
            .read(|snapshot| telemetry::open_alerts(snapshot, point_id, limit))
    }

    // =========================================================================
    // CATALOG
    // =========================================================================

    pub fn seed_catalog(&self, catalog: &Catalog) -> Result<SeedReport, TwinError> {
        catalog.seed(&self.store)
    }
}

// =============================================================================
// TESTS
// =============================================================================
