//! # pipetwin-core
//!
//! The Asset Topology & Telemetry Engine for a utility pipe-network digital
//! twin - THE LOGIC.
//!
//! This crate owns the asset graph layered over geospatial features and the
//! telemetry pipeline that feeds it:
//!
//! - `topology`: derives junctions and segments from pipe line geometry
//! - `trace`: upstream/downstream reachability over the segment graph
//! - `drilldown`: bounded neighborhood with prioritized fallback synthesis
//! - `ingestor` / `telemetry`: sample ingestion, thresholds, alerts, queries
//! - `mutation` / `audit`: transactional pipe writes with before/after history
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - One request is one redb unit of work; a failed sync rolls back the
//!   feature write that triggered it
//! - Auto-derived ids are content hashes, so re-syncing is idempotent
//! - The HTTP and CLI layers only call through [`TwinEngine`]

// =============================================================================
// MODULES
// =============================================================================

pub mod audit;
pub mod catalog;
pub mod codec;
pub mod drilldown;
pub mod engine;
pub mod fallback;
pub mod feature_store;
pub mod geometry;
pub mod ids;
pub mod ingestor;
pub mod links;
pub mod mutation;
pub mod primitives;
pub mod storage;
pub mod telemetry;
pub mod thresholds;
pub mod topology;
pub mod trace;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AlertEvent, AssetNode, AssetRelation, AuditAction, AuditLogEntry, Building, Direction,
    Equipment, EquipmentEntry, ErrorKind, Feature, IngestOutcome, LinkedBuilding, Metric,
    MetricLatest, MetricSample, NearbyFeature, PipeSegment, Properties, Room, RuleState,
    SensorPoint, Severity, SyncFailure, TelemetrySample, ThresholdBounds, ThresholdRule,
    TwinError, Valve,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use catalog::{Catalog, CatalogFeature, SeedReport};
pub use drilldown::{Drilldown, DrilldownAggregator};
pub use engine::TwinEngine;
pub use fallback::{FallbackChain, Resolved};
pub use feature_store::{FeatureReader, FeatureStore};
pub use geometry::{Coord, Geometry};
pub use ingestor::TelemetryIngestor;
pub use mutation::{MutationEngine, MutationReceipt};
pub use storage::{StoreStats, TwinStore};
pub use topology::{SegmentAttributes, SyncReport, TopologySynchronizer};
pub use trace::{TraceEngine, TracePath, TraceResult};
