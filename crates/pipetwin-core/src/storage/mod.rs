//! # Storage Module
//!
//! Persistent state for the pipetwin engine, backed by redb.
//!
//! Every table maps a string key to postcard-encoded bytes. Reads go through
//! the object-safe [`TwinRead`] trait, writes through [`TwinWrite`]; the typed
//! `*_as` helpers live on the blanket extension traits so engines can accept
//! `&dyn TwinRead` and still decode records.
//!
//! ## Keys
//!
//! Composite keys join their parts with [`KEY_SEPARATOR`] and sequence
//! numbers are zero-padded, so a prefix scan returns rows of one owner in
//! insertion order.

mod redb_twin;

pub use redb_twin::{Snapshot, StoreStats, TwinStore, UnitOfWork};

use crate::TwinError;
use crate::codec::{decode, encode};
use redb::TableDefinition;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A record table: string key to encoded bytes.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Separator between the parts of a composite key.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Join key parts with [`KEY_SEPARATOR`].
#[must_use]
pub fn composite_key(parts: &[&str]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part);
    }
    key
}

/// Prefix matching every composite key that starts with `parts`.
#[must_use]
pub fn key_prefix(parts: &[&str]) -> String {
    let mut prefix = composite_key(parts);
    prefix.push(KEY_SEPARATOR);
    prefix
}

/// Zero-padded sequence number, sortable as text.
#[must_use]
pub fn sequence_key(sequence: u64) -> String {
    format!("{sequence:020}")
}

// =============================================================================
// TABLES
// =============================================================================

/// Table definitions. Keys are listed next to each table.
pub mod tables {
    use super::RecordTable;
    use redb::TableDefinition;

    /// feature id
    pub const FEATURES: RecordTable = TableDefinition::new("features");
    /// node id
    pub const NODES: RecordTable = TableDefinition::new("asset_nodes");
    /// segment id
    pub const SEGMENTS: RecordTable = TableDefinition::new("pipe_segments");
    /// feature id -> segment id
    pub const SEGMENT_BY_FEATURE: RecordTable = TableDefinition::new("segment_by_feature");
    /// relation id
    pub const RELATIONS: RecordTable = TableDefinition::new("asset_relations");
    /// valve id
    pub const VALVES: RecordTable = TableDefinition::new("valves");
    /// building id
    pub const BUILDINGS: RecordTable = TableDefinition::new("buildings");
    /// building id, room id
    pub const ROOMS: RecordTable = TableDefinition::new("rooms");
    /// equipment id
    pub const EQUIPMENT: RecordTable = TableDefinition::new("equipment");
    /// point id
    pub const SENSOR_POINTS: RecordTable = TableDefinition::new("sensor_points");
    /// point id, metric, sequence
    pub const TELEMETRY_HISTORY: RecordTable = TableDefinition::new("telemetry_history");
    /// point id, metric
    pub const TELEMETRY_LATEST: RecordTable = TableDefinition::new("telemetry_latest");
    /// point id, metric
    pub const THRESHOLDS: RecordTable = TableDefinition::new("threshold_rules");
    /// sequence
    pub const ALERTS: RecordTable = TableDefinition::new("alert_events");
    /// feature id, sequence
    pub const AUDIT_LOG: RecordTable = TableDefinition::new("audit_log");

    /// Sequence counters: name -> last issued value.
    pub const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

    pub(crate) const ALL: [RecordTable; 15] = [
        FEATURES,
        NODES,
        SEGMENTS,
        SEGMENT_BY_FEATURE,
        RELATIONS,
        VALVES,
        BUILDINGS,
        ROOMS,
        EQUIPMENT,
        SENSOR_POINTS,
        TELEMETRY_HISTORY,
        TELEMETRY_LATEST,
        THRESHOLDS,
        ALERTS,
        AUDIT_LOG,
    ];
}

// =============================================================================
// ACCESS TRAITS
// =============================================================================

/// Read access to the store: one consistent snapshot or the current unit of
/// work (which also sees its own uncommitted writes).
pub trait TwinRead {
    /// Raw bytes stored under `key`.
    fn fetch(&self, table: RecordTable, key: &str) -> Result<Option<Vec<u8>>, TwinError>;

    /// All rows whose key starts with `prefix`, in key order. An empty
    /// prefix scans the whole table.
    fn scan(&self, table: RecordTable, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TwinError>;
}

/// Write access inside one unit of work.
pub trait TwinWrite: TwinRead {
    fn put(&self, table: RecordTable, key: &str, bytes: &[u8]) -> Result<(), TwinError>;

    /// Issue the next value of a named sequence, starting at 1.
    fn next_sequence(&self, name: &str) -> Result<u64, TwinError>;
}

/// Typed helpers over [`TwinRead`].
pub trait TwinReadExt: TwinRead {
    fn get_as<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        key: &str,
    ) -> Result<Option<T>, TwinError> {
        self.fetch(table, key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn scan_as<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        prefix: &str,
    ) -> Result<Vec<T>, TwinError> {
        self.scan(table, prefix)?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }

    fn contains(&self, table: RecordTable, key: &str) -> Result<bool, TwinError> {
        Ok(self.fetch(table, key)?.is_some())
    }
}

impl<R: TwinRead + ?Sized> TwinReadExt for R {}

/// Typed helpers over [`TwinWrite`].
pub trait TwinWriteExt: TwinWrite {
    fn put_as<T: Serialize>(&self, table: RecordTable, key: &str, value: &T) -> Result<(), TwinError> {
        let bytes = encode(value)?;
        self.put(table, key, &bytes)
    }
}

impl<W: TwinWrite + ?Sized> TwinWriteExt for W {}
