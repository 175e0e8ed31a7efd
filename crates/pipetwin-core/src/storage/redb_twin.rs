//! # redb-backed Twin Storage
//!
//! A disk-backed (or in-memory) store using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Units of Work
//!
//! [`TwinStore::write`] runs a closure inside one write transaction. The
//! transaction commits when the closure returns `Ok` and is aborted when it
//! returns `Err`, so a feature write, its topology sync and its audit entry
//! are applied together or not at all. [`TwinStore::read`] runs a closure
//! against one committed snapshot.

use super::tables::{self, METADATA};
use super::{RecordTable, TwinRead, TwinWrite};
use crate::TwinError;
use redb::backends::InMemoryBackend;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    WriteTransaction,
};
use serde::Serialize;
use std::path::Path;

fn storage<E: std::fmt::Display>(e: E) -> TwinError {
    TwinError::Storage(e.to_string())
}

/// The persistent twin store.
pub struct TwinStore {
    db: Database,
    in_memory: bool,
}

impl std::fmt::Debug for TwinStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwinStore")
            .field("in_memory", &self.in_memory)
            .finish_non_exhaustive()
    }
}

impl TwinStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TwinError> {
        let db = Database::create(path.as_ref()).map_err(storage)?;
        Self::initialize(db, false)
    }

    /// Create a store that lives only in memory.
    pub fn in_memory() -> Result<Self, TwinError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage)?;
        Self::initialize(db, true)
    }

    fn initialize(db: Database, in_memory: bool) -> Result<Self, TwinError> {
        // Create every table up front so read transactions never see a
        // missing table.
        let write_txn = db.begin_write().map_err(storage)?;
        for table in tables::ALL {
            let _ = write_txn.open_table(table).map_err(storage)?;
        }
        let _ = write_txn.open_table(METADATA).map_err(storage)?;
        write_txn.commit().map_err(storage)?;

        tracing::debug!(in_memory, "twin store opened");
        Ok(Self { db, in_memory })
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    /// Run `f` against one committed snapshot.
    pub fn read<T>(
        &self,
        f: impl FnOnce(&Snapshot) -> Result<T, TwinError>,
    ) -> Result<T, TwinError> {
        let snapshot = Snapshot {
            txn: self.db.begin_read().map_err(storage)?,
        };
        f(&snapshot)
    }

    /// Run `f` as one unit of work: commit on `Ok`, roll back on `Err`.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&UnitOfWork) -> Result<T, TwinError>,
    ) -> Result<T, TwinError> {
        let uow = UnitOfWork {
            txn: self.db.begin_write().map_err(storage)?,
        };
        match f(&uow) {
            Ok(value) => {
                uow.txn.commit().map_err(storage)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = uow.txn.abort() {
                    tracing::warn!(error = %abort_err, "abort after failed unit of work");
                }
                tracing::debug!(code = err.code(), "unit of work rolled back");
                Err(err)
            }
        }
    }

    /// Row counts per table.
    pub fn stats(&self) -> Result<StoreStats, TwinError> {
        let txn = self.db.begin_read().map_err(storage)?;
        let count = |table: RecordTable| -> Result<u64, TwinError> {
            txn.open_table(table).map_err(storage)?.len().map_err(storage)
        };
        Ok(StoreStats {
            features: count(tables::FEATURES)?,
            nodes: count(tables::NODES)?,
            segments: count(tables::SEGMENTS)?,
            relations: count(tables::RELATIONS)?,
            valves: count(tables::VALVES)?,
            buildings: count(tables::BUILDINGS)?,
            rooms: count(tables::ROOMS)?,
            equipment: count(tables::EQUIPMENT)?,
            sensor_points: count(tables::SENSOR_POINTS)?,
            samples: count(tables::TELEMETRY_HISTORY)?,
            alerts: count(tables::ALERTS)?,
            audit_entries: count(tables::AUDIT_LOG)?,
        })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), TwinError> {
        self.db.compact().map_err(storage)?;
        Ok(())
    }
}

/// Row counts reported by `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub features: u64,
    pub nodes: u64,
    pub segments: u64,
    pub relations: u64,
    pub valves: u64,
    pub buildings: u64,
    pub rooms: u64,
    pub equipment: u64,
    pub sensor_points: u64,
    pub samples: u64,
    pub alerts: u64,
    pub audit_entries: u64,
}

// =============================================================================
// TABLE ACCESS
// =============================================================================

fn fetch_from<T>(table: &T, key: &str) -> Result<Option<Vec<u8>>, TwinError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(table
        .get(key)
        .map_err(storage)?
        .map(|guard| guard.value().to_vec()))
}

fn scan_from<T>(table: &T, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TwinError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.range::<&str>(prefix..).map_err(storage)? {
        let (key, value) = entry.map_err(storage)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        rows.push((key.to_string(), value.value().to_vec()));
    }
    Ok(rows)
}

/// A committed, read-only snapshot.
pub struct Snapshot {
    txn: ReadTransaction,
}

impl TwinRead for Snapshot {
    fn fetch(&self, table: RecordTable, key: &str) -> Result<Option<Vec<u8>>, TwinError> {
        let table = self.txn.open_table(table).map_err(storage)?;
        fetch_from(&table, key)
    }

    fn scan(&self, table: RecordTable, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TwinError> {
        let table = self.txn.open_table(table).map_err(storage)?;
        scan_from(&table, prefix)
    }
}

/// One open write transaction.
pub struct UnitOfWork {
    txn: WriteTransaction,
}

impl TwinRead for UnitOfWork {
    fn fetch(&self, table: RecordTable, key: &str) -> Result<Option<Vec<u8>>, TwinError> {
        let table = self.txn.open_table(table).map_err(storage)?;
        fetch_from(&table, key)
    }

    fn scan(&self, table: RecordTable, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, TwinError> {
        let table = self.txn.open_table(table).map_err(storage)?;
        scan_from(&table, prefix)
    }
}

impl TwinWrite for UnitOfWork {
    fn put(&self, table: RecordTable, key: &str, bytes: &[u8]) -> Result<(), TwinError> {
        let mut table = self.txn.open_table(table).map_err(storage)?;
        table.insert(key, bytes).map_err(storage)?;
        Ok(())
    }

    fn next_sequence(&self, name: &str) -> Result<u64, TwinError> {
        let mut table = self.txn.open_table(METADATA).map_err(storage)?;
        let current = table
            .get(name)
            .map_err(storage)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current.saturating_add(1);
        table.insert(name, next).map_err(storage)?;
        Ok(next)
    }
}

// =============================================================================
// TESTS
// =============================================================================
