//! # Telemetry Queries
//!
//! Read side of the telemetry pipeline: latest values, history windows and
//! open alerts. Every list is ordered newest first and bounded by a clamped
//! limit.

use crate::ingestor::parse_timestamp;
use crate::primitives::{ALERT_OPEN, HISTORY_LIMIT, LATEST_LIMIT};
use crate::storage::{TwinRead, TwinReadExt, key_prefix, tables};
use crate::types::{AlertEvent, Metric, MetricLatest, MetricSample};
use crate::TwinError;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;

/// Split a comma-separated id list, trimming entries and dropping blanks and
/// repeats. Order of first appearance is kept.
#[must_use]
pub fn split_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

fn parse_metric(metric: Option<&str>) -> Result<Option<Metric>, TwinError> {
    match metric.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some),
    }
}

fn newest_first(rows: &mut [MetricSample]) {
    rows.sort_by(|a, b| {
        b.sampled_at
            .cmp(&a.sampled_at)
            .then_with(|| a.point_id.cmp(&b.point_id))
            .then_with(|| a.metric.cmp(&b.metric))
    });
}

/// Latest row per `(pointId, metric)`, optionally restricted to some points
/// and one metric. `limit` defaults to 500, clamped to `1..=5000`.
pub fn latest_telemetry(
    reader: &dyn TwinRead,
    point_ids: Option<&[String]>,
    metric: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<MetricLatest>, TwinError> {
    let metric = parse_metric(metric)?;
    let mut rows: Vec<MetricLatest> = match point_ids {
        Some(ids) if !ids.is_empty() => {
            let mut rows = Vec::new();
            for id in ids.iter().collect::<IndexSet<_>>() {
                rows.extend(reader.scan_as::<MetricLatest>(tables::TELEMETRY_LATEST, &key_prefix(&[id.as_str()]))?);
            }
            rows
        }
        _ => reader.scan_as(tables::TELEMETRY_LATEST, "")?,
    };
    if let Some(metric) = metric {
        rows.retain(|r| r.metric == metric);
    }
    newest_first(&mut rows);
    rows.truncate(LATEST_LIMIT.resolve(limit));
    Ok(rows)
}

/// Latest rows whose feature is one of `feature_ids`, newest first.
pub fn latest_by_features(
    reader: &dyn TwinRead,
    feature_ids: &[String],
) -> Result<Vec<MetricLatest>, TwinError> {
    let wanted: IndexSet<&str> = feature_ids
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let mut rows: Vec<MetricLatest> = reader.scan_as(tables::TELEMETRY_LATEST, "")?;
    rows.retain(|r| r.feature_id.as_deref().is_some_and(|f| wanted.contains(f)));
    newest_first(&mut rows);
    Ok(rows)
}

/// Parse an optional window bound.
fn window_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, TwinError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_timestamp(text)
            .map(Some)
            .ok_or_else(|| TwinError::InvalidTimeRange(format!("{name} {text:?} is not RFC 3339"))),
    }
}

/// History of one point, optionally one metric, within an inclusive
/// `[from, to]` window. `limit` defaults to 1000, clamped to `1..=5000`.
pub fn telemetry_history(
    reader: &dyn TwinRead,
    point_id: &str,
    metric: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<MetricSample>, TwinError> {
    let point_id = point_id.trim();
    if point_id.is_empty() {
        return Err(TwinError::PointIdRequired);
    }
    let metric = parse_metric(metric)?;
    let from = window_bound("from", from)?;
    let to = window_bound("to", to)?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(TwinError::InvalidTimeRange("from is after to".to_string()));
        }
    }

    let prefix = match metric {
        Some(metric) => key_prefix(&[point_id, metric.as_str()]),
        None => key_prefix(&[point_id]),
    };
    let mut rows: Vec<MetricSample> = reader.scan_as(tables::TELEMETRY_HISTORY, &prefix)?;
    rows.retain(|r| {
        from.is_none_or(|f| r.sampled_at >= f) && to.is_none_or(|t| r.sampled_at <= t)
    });
    newest_first(&mut rows);
    rows.truncate(HISTORY_LIMIT.resolve(limit));
    Ok(rows)
}

/// Open alerts, newest first, optionally for one point. `limit` as for
/// [`latest_telemetry`].
pub fn open_alerts(
    reader: &dyn TwinRead,
    point_id: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<AlertEvent>, TwinError> {
    let point_id = point_id.map(str::trim).filter(|p| !p.is_empty());
    let mut alerts: Vec<AlertEvent> = reader.scan_as(tables::ALERTS, "")?;
    alerts.retain(|a| a.status == ALERT_OPEN && point_id.is_none_or(|p| a.point_id == p));
    alerts.reverse();
    alerts.truncate(LATEST_LIMIT.resolve(limit));
    Ok(alerts)
}

// =============================================================================
// TESTS
// =============================================================================
