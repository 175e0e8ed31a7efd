//! # CLI Command Implementations

use super::CliError;
use crate::api;
use crate::config::TwinConfig;
use pipetwin_core::{Catalog, TelemetrySample, TwinEngine};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a catalog or samples file (100 MB).
const MAX_INPUT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Resolve `path` to an existing regular file no larger than
/// [`MAX_INPUT_FILE_SIZE`] and read it.
fn read_input_file(path: &Path) -> Result<String, CliError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| CliError::Io(format!("invalid file path '{}': {e}", path.display())))?;
    if !canonical.is_file() {
        return Err(CliError::Io(format!(
            "path '{}' is not a regular file",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| CliError::Io(format!("cannot read file metadata: {e}")))?;
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(CliError::Io(format!(
            "file size {} bytes exceeds maximum allowed {MAX_INPUT_FILE_SIZE} bytes",
            metadata.len()
        )));
    }

    std::fs::read_to_string(&canonical)
        .map_err(|e| CliError::Io(format!("read '{}': {e}", path.display())))
}

fn open_engine(config: &TwinConfig) -> Result<TwinEngine, CliError> {
    Ok(TwinEngine::open(&config.storage.database)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Io(format!("encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &TwinConfig) -> Result<(), CliError> {
    let engine = open_engine(config)?;
    let addr = config.bind_addr();

    println!("pipetwin server starting");
    println!();
    println!("Configuration:");
    println!("  Address:  {addr}");
    println!("  Database: {}", config.storage.database.display());
    println!("  Auth:     {}", if config.api_key().is_some() { "api key" } else { "disabled" });
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&addr, engine, config.security.clone())
        .await
        .map_err(|e| CliError::Io(format!("server on {addr}: {e}")))
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(config: &TwinConfig, force: bool) -> Result<(), CliError> {
    let path: &PathBuf = &config.storage.database;
    if path.exists() {
        if !force {
            return Err(CliError::Io(format!(
                "database {} already exists. Use --force to overwrite.",
                path.display()
            )));
        }
        std::fs::remove_file(path)
            .map_err(|e| CliError::Io(format!("remove {}: {e}", path.display())))?;
    }

    open_engine(config)?;
    println!("Initialized new twin database at {}", path.display());
    Ok(())
}

// =============================================================================
// SEED COMMAND
// =============================================================================

/// Load a catalog document.
pub fn cmd_seed(config: &TwinConfig, json_mode: bool, file: &Path) -> Result<(), CliError> {
    let catalog = Catalog::from_json(&read_input_file(file)?)?;
    let engine = open_engine(config)?;
    let report = engine.seed_catalog(&catalog)?;

    if json_mode {
        return print_json(&report);
    }
    println!("Seeded catalog from {}", file.display());
    println!("  Features:   {}", report.features);
    println!("  Buildings:  {}", report.buildings);
    println!("  Rooms:      {}", report.rooms);
    println!("  Equipment:  {}", report.equipment);
    println!("  Valves:     {}", report.valves);
    println!("  Relations:  {}", report.relations);
    println!("  Segments:   {}", report.synced_segments);
    Ok(())
}

// =============================================================================
// TRACE COMMAND
// =============================================================================

pub fn cmd_trace(
    config: &TwinConfig,
    json_mode: bool,
    start: &str,
    direction: &str,
) -> Result<(), CliError> {
    let trace = open_engine(config)?.trace(start, Some(direction))?;

    if json_mode {
        return print_json(&trace);
    }
    println!("Trace {} from {}", trace.direction.as_str(), trace.start_id);
    println!("==================");
    if trace.path_segment_ids.is_empty() {
        println!("No segment matches {start}");
        return Ok(());
    }
    for (segment_id, feature_id) in trace.path_segment_ids.iter().zip(&trace.path_feature_ids) {
        println!("  {segment_id}  ({feature_id})");
    }
    println!();
    println!("Nodes:     {}", trace.node_ids.len());
    println!("Buildings: {}", trace.linked_buildings.len());
    for building in &trace.linked_buildings {
        match building.distance_meters {
            Some(meters) => println!("  {} ({}) {meters} m", building.name, building.id),
            None => println!("  {} ({})", building.name, building.id),
        }
    }
    Ok(())
}

// =============================================================================
// DRILLDOWN COMMAND
// =============================================================================

pub fn cmd_drilldown(config: &TwinConfig, json_mode: bool, feature: &str) -> Result<(), CliError> {
    let view = open_engine(config)?.drilldown(feature)?;

    if json_mode {
        return print_json(&view);
    }
    println!("Drilldown {}", view.feature_id);
    println!("==================");
    match &view.segment {
        Some(segment) => println!("Segment:    {} [{}]", segment.id, segment.status),
        None => println!("Segment:    none"),
    }
    println!("Nodes:      {}", view.nodes.len());
    println!("Relations:  {}", view.relations.len());
    println!("Buildings:  {}", view.linked_buildings.len());
    println!("Rooms:      {}", view.impacted_rooms.len());
    println!("Valves:     {}", view.valves.len());
    println!("Equipment:  {}", view.equipments.len());
    for equipment in &view.equipments {
        println!(
            "  {} {} ({}, {})",
            equipment.equipment_type, equipment.name, equipment.status, equipment.source
        );
    }
    Ok(())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// A samples file holds one sample or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum SampleFile {
    Many(Vec<TelemetrySample>),
    One(TelemetrySample),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestSummary {
    accepted: usize,
    rejected: usize,
    alerts: usize,
}

/// Ingest samples; each sample commits on its own.
pub fn cmd_ingest(config: &TwinConfig, json_mode: bool, file: &Path) -> Result<(), CliError> {
    let text = read_input_file(file)?;
    let samples = match serde_json::from_str::<SampleFile>(&text)
        .map_err(|e| CliError::Io(format!("invalid samples file: {e}")))?
    {
        SampleFile::Many(samples) => samples,
        SampleFile::One(sample) => vec![sample],
    };

    let engine = open_engine(config)?;
    let mut summary = IngestSummary {
        accepted: 0,
        rejected: 0,
        alerts: 0,
    };
    for (index, result) in engine.ingest_batch(&samples).into_iter().enumerate() {
        match result {
            Ok(outcome) => {
                summary.accepted += 1;
                if outcome.alert_created {
                    summary.alerts += 1;
                }
            }
            Err(e) => {
                summary.rejected += 1;
                tracing::warn!(index, code = e.code(), error = %e, "sample rejected");
            }
        }
    }

    if json_mode {
        return print_json(&summary);
    }
    println!(
        "Ingested {} samples ({} rejected, {} alerts raised)",
        summary.accepted, summary.rejected, summary.alerts
    );
    Ok(())
}

// =============================================================================
// AUDIT COMMAND
// =============================================================================

pub fn cmd_audit(
    config: &TwinConfig,
    json_mode: bool,
    feature: &str,
    limit: Option<i64>,
) -> Result<(), CliError> {
    let entries = open_engine(config)?.list_audit_log(feature, limit)?;

    if json_mode {
        return print_json(&entries);
    }
    println!("Audit log of {feature}");
    println!("==================");
    if entries.is_empty() {
        println!("No entries");
    }
    for entry in &entries {
        println!(
            "  #{} {} {} by {}",
            entry.id,
            entry.changed_at.to_rfc3339(),
            entry.action,
            entry.changed_by
        );
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

pub fn cmd_status(config: &TwinConfig, json_mode: bool) -> Result<(), CliError> {
    let stats = open_engine(config)?.stats()?;

    if json_mode {
        return print_json(&serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "stats": stats,
        }));
    }
    println!("pipetwin Status");
    println!("==================");
    println!("Database:      {}", config.storage.database.display());
    println!();
    println!("Features:      {}", stats.features);
    println!("Nodes:         {}", stats.nodes);
    println!("Segments:      {}", stats.segments);
    println!("Relations:     {}", stats.relations);
    println!("Valves:        {}", stats.valves);
    println!("Buildings:     {}", stats.buildings);
    println!("Rooms:         {}", stats.rooms);
    println!("Equipment:     {}", stats.equipment);
    println!("Sensor points: {}", stats.sensor_points);
    println!("Samples:       {}", stats.samples);
    println!("Alerts:        {}", stats.alerts);
    println!("Audit entries: {}", stats.audit_entries);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
