//! # Telemetry Ingestor
//!
//! Validation and ingestion protocol for sensor samples.
//!
//! - Validate every field before anything is written
//! - Reject malformed input with a named error
//! - Upsert the sensor point, append history, overwrite latest
//! - Evaluate the enabled threshold rule and raise at most one alert
//!
//! All writes of one sample happen in a single unit of work.

use crate::primitives::{ALERT_OPEN, DEFAULT_QUALITY, DEFAULT_SOURCE, POINT_ONLINE};
use crate::storage::{TwinReadExt, TwinStore, TwinWrite, TwinWriteExt, composite_key, sequence_key, tables};
use crate::thresholds::{Breach, evaluate};
use crate::types::{
    AlertEvent, IngestOutcome, Metric, MetricSample, Properties, RuleState, SensorPoint,
    TelemetrySample, ThresholdBounds, ThresholdRule,
};
use crate::TwinError;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A sample that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSample {
    pub point_id: String,
    pub feature_id: Option<String>,
    pub point_name: Option<String>,
    pub metric: Metric,
    pub value: f64,
    pub unit: Option<String>,
    pub sampled_at: DateTime<Utc>,
    pub quality: String,
    pub source: String,
}

fn non_blank(raw: Option<&String>) -> Option<String> {
    raw.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Trimmed text of a JSON string; anything else counts as absent.
fn json_text(raw: Option<&Value>) -> Option<String> {
    match raw {
        Some(Value::String(s)) => non_blank(Some(s)),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// The TelemetryIngestor validates and stores samples.
pub struct TelemetryIngestor;

impl TelemetryIngestor {
    /// Validate a raw sample. Checks run in a fixed order and the first
    /// failure is returned:
    ///
    /// 1. `pointId` a non-blank string (`PointIdRequired`)
    /// 2. `metric` exactly one of the four metric names (`InvalidMetric`)
    /// 3. `value` a finite JSON number (`ValueRequired`)
    /// 4. `sampledAt` an RFC 3339 string when present (`InvalidSampledAt`);
    ///    absent, null or blank means `now`
    pub fn validate(sample: &TelemetrySample, now: DateTime<Utc>) -> Result<ValidSample, TwinError> {
        let point_id = json_text(sample.point_id.as_ref()).ok_or(TwinError::PointIdRequired)?;

        let metric: Metric = match sample.metric.as_ref() {
            Some(Value::String(raw)) => raw.parse()?,
            Some(other) => return Err(TwinError::InvalidMetric(other.to_string())),
            None => return Err(TwinError::InvalidMetric(String::new())),
        };

        let value = match &sample.value {
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
        .filter(|v| v.is_finite())
        .ok_or(TwinError::ValueRequired)?;

        let sampled_at = match sample.sampled_at.as_ref() {
            None | Some(Value::Null) => now,
            Some(Value::String(raw)) if raw.trim().is_empty() => now,
            Some(Value::String(raw)) => {
                parse_timestamp(raw).ok_or_else(|| TwinError::InvalidSampledAt(raw.clone()))?
            }
            Some(other) => return Err(TwinError::InvalidSampledAt(other.to_string())),
        };

        Ok(ValidSample {
            point_id,
            feature_id: non_blank(sample.feature_id.as_ref()),
            point_name: non_blank(sample.point_name.as_ref()),
            metric,
            value,
            unit: non_blank(sample.unit.as_ref()),
            sampled_at,
            quality: non_blank(sample.quality.as_ref()).unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
            source: non_blank(sample.source.as_ref()).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        })
    }

    /// Validate and ingest one sample.
    pub fn ingest(store: &TwinStore, sample: &TelemetrySample) -> Result<IngestOutcome, TwinError> {
        let now = Utc::now();
        let valid = Self::validate(sample, now)?;
        let outcome = store.write(|uow| Self::apply(uow, &valid, now))?;

        if outcome.alert_created {
            tracing::info!(
                point_id = %outcome.point_id,
                metric = %outcome.metric,
                severity = ?outcome.severity,
                "threshold alert raised"
            );
        }
        Ok(outcome)
    }

    /// Write a validated sample inside an open unit of work.
    pub fn apply<W: TwinWrite + ?Sized>(
        uow: &W,
        sample: &ValidSample,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, TwinError> {
        let point = Self::upsert_point(uow, sample, now)?;
        let metric_key = composite_key(&[sample.point_id.as_str(), sample.metric.as_str()]);

        let row = MetricSample {
            point_id: sample.point_id.clone(),
            feature_id: point.feature_id.clone(),
            metric: sample.metric,
            value: sample.value,
            unit: sample.unit.clone(),
            sampled_at: sample.sampled_at,
            quality: sample.quality.clone(),
            source: sample.source.clone(),
        };
        let sequence = uow.next_sequence("telemetry")?;
        let history_key = composite_key(&[
            sample.point_id.as_str(),
            sample.metric.as_str(),
            sequence_key(sequence).as_str(),
        ]);
        uow.put_as(tables::TELEMETRY_HISTORY, &history_key, &row)?;
        uow.put_as(tables::TELEMETRY_LATEST, &metric_key, &row)?;

        let rule: Option<ThresholdRule> = uow.get_as(tables::THRESHOLDS, &metric_key)?;
        let (rule_state, breach) = match rule {
            None => (RuleState::NoRule, None),
            Some(rule) if !rule.enabled => (RuleState::Disabled, None),
            Some(rule) => (RuleState::Evaluated, evaluate(&rule.bounds(), sample.value)),
        };

        let alert_id = match breach {
            Some(breach) => Some(Self::raise_alert(uow, &row, breach, now)?),
            None => None,
        };

        Ok(IngestOutcome {
            ok: true,
            point_id: sample.point_id.clone(),
            metric: sample.metric,
            sampled_at: sample.sampled_at,
            alert_created: alert_id.is_some(),
            severity: breach.map(|b| b.severity),
            threshold_value: breach.map(|b| b.threshold_value),
            alert_id,
            rule_state,
        })
    }

    fn upsert_point<W: TwinWrite + ?Sized>(
        uow: &W,
        sample: &ValidSample,
        now: DateTime<Utc>,
    ) -> Result<SensorPoint, TwinError> {
        let existing: Option<SensorPoint> = uow.get_as(tables::SENSOR_POINTS, &sample.point_id)?;
        let (feature_id, previous_name) = match existing {
            Some(p) => (p.feature_id.or_else(|| sample.feature_id.clone()), Some(p.point_name)),
            None => (sample.feature_id.clone(), None),
        };
        let point = SensorPoint {
            id: sample.point_id.clone(),
            feature_id,
            point_name: sample
                .point_name
                .clone()
                .or(previous_name)
                .unwrap_or_else(|| format!("point-{}", sample.point_id)),
            point_type: sample.metric,
            status: POINT_ONLINE.to_string(),
            updated_at: now,
        };
        uow.put_as(tables::SENSOR_POINTS, &point.id, &point)?;
        Ok(point)
    }

    fn raise_alert<W: TwinWrite + ?Sized>(
        uow: &W,
        row: &MetricSample,
        breach: Breach,
        now: DateTime<Utc>,
    ) -> Result<String, TwinError> {
        let sequence = uow.next_sequence("alert")?;
        let mut properties = Properties::new()
            .with("sampledAt", row.sampled_at.to_rfc3339())
            .with("quality", row.quality.as_str());
        if let Some(unit) = &row.unit {
            properties.insert("unit", unit.as_str());
        }
        let alert = AlertEvent {
            id: sequence.to_string(),
            point_id: row.point_id.clone(),
            feature_id: row.feature_id.clone(),
            metric: row.metric,
            severity: breach.severity,
            message: format!(
                "point {} metric {} triggered {}",
                row.point_id, row.metric, breach.severity
            ),
            value: row.value,
            threshold_value: breach.threshold_value,
            status: ALERT_OPEN.to_string(),
            properties,
            created_at: now,
        };
        uow.put_as(tables::ALERTS, &sequence_key(sequence), &alert)?;
        Ok(alert.id)
    }

    /// Create or replace the rule for `(pointId, metric)`. Last write wins.
    /// `enabled` defaults to true.
    pub fn upsert_threshold(
        store: &TwinStore,
        point_id: &str,
        metric: &str,
        bounds: ThresholdBounds,
        enabled: Option<bool>,
    ) -> Result<ThresholdRule, TwinError> {
        let point_id = point_id.trim();
        if point_id.is_empty() {
            return Err(TwinError::PointIdRequired);
        }
        let metric: Metric = metric.parse()?;
        let rule = ThresholdRule {
            point_id: point_id.to_string(),
            metric,
            warn_low: bounds.warn_low,
            warn_high: bounds.warn_high,
            alarm_low: bounds.alarm_low,
            alarm_high: bounds.alarm_high,
            enabled: enabled.unwrap_or(true),
            updated_at: Utc::now(),
        };
        store.write(|uow| {
            uow.put_as(
                tables::THRESHOLDS,
                &composite_key(&[point_id, metric.as_str()]),
                &rule,
            )
        })?;
        tracing::debug!(point_id, %metric, enabled = rule.enabled, "threshold rule stored");
        Ok(rule)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        parse_timestamp("2026-03-01T08:00:00Z").expect("timestamp")
    }

    #[test]
    fn validation_order() {
        let mut sample = TelemetrySample::default();
        assert!(matches!(TelemetryIngestor::validate(&sample, now()), Err(TwinError::PointIdRequired)));

        sample.point_id = Some("  P1 ".into());
        assert!(matches!(TelemetryIngestor::validate(&sample, now()), Err(TwinError::InvalidMetric(_))));

        sample.metric = Some(" pressure ".into());
        assert!(matches!(TelemetryIngestor::validate(&sample, now()), Err(TwinError::ValueRequired)));

        sample.value = Some(json!("not a number"));
        assert!(matches!(TelemetryIngestor::validate(&sample, now()), Err(TwinError::ValueRequired)));

        sample.value = Some(json!(42.5));
        sample.sampled_at = Some("yesterday".into());
        assert!(matches!(TelemetryIngestor::validate(&sample, now()), Err(TwinError::InvalidSampledAt(_))));

        sample.sampled_at = None;
        let valid = TelemetryIngestor::validate(&sample, now()).expect("valid");
        assert_eq!(valid.point_id, "P1");
        assert_eq!(valid.metric, Metric::Pressure);
        assert_eq!(valid.value, 42.5);
        assert_eq!(valid.sampled_at, now());
        assert_eq!(valid.quality, "good");
        assert_eq!(valid.source, "ingest");
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        let sample = TelemetrySample::new("P1", "flow", 1.0).at("2026-03-01T10:00:00+02:00");
        let valid = TelemetryIngestor::validate(&sample, now()).expect("valid");
        assert_eq!(valid.sampled_at, now());
    }

    #[test]
    fn ingest_without_rule_creates_no_alert() {
        let store = TwinStore::in_memory().expect("open");
        let outcome = TelemetryIngestor::ingest(&store, &TelemetrySample::new("P1", "flow", 3.0)).expect("ingest");
        assert!(outcome.ok);
        assert!(!outcome.alert_created);
        assert_eq!(outcome.rule_state, RuleState::NoRule);

        let point: SensorPoint = store
            .read(|s| s.get_as(tables::SENSOR_POINTS, "P1"))
            .expect("read")
            .expect("point");
        assert_eq!(point.point_name, "point-P1");
        assert_eq!(point.status, "online");
        assert_eq!(point.point_type, Metric::Flow);
    }

    #[test]
    fn alarm_rule_raises_one_critical_alert() {
        let store = TwinStore::in_memory().expect("open");
        TelemetryIngestor::upsert_threshold(
            &store,
            "P1",
            "pressure",
            ThresholdBounds {
                alarm_high: Some(100.0),
                warn_high: Some(80.0),
                ..ThresholdBounds::default()
            },
            None,
        )
        .expect("rule");

        let outcome = TelemetryIngestor::ingest(&store, &TelemetrySample::new("P1", "pressure", 120.0))
            .expect("ingest");
        assert!(outcome.alert_created);
        assert_eq!(outcome.severity, Some(Severity::Critical));
        assert_eq!(outcome.threshold_value, Some(100.0));
        assert_eq!(outcome.rule_state, RuleState::Evaluated);

        let alerts: Vec<AlertEvent> = store.read(|s| s.scan_as(tables::ALERTS, "")).expect("alerts");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "point P1 metric pressure triggered critical");
        assert_eq!(alerts[0].status, "open");
    }

    #[test]
    fn disabled_rule_is_reported() {
        let store = TwinStore::in_memory().expect("open");
        TelemetryIngestor::upsert_threshold(
            &store,
            "P1",
            "pressure",
            ThresholdBounds {
                alarm_low: Some(50.0),
                ..ThresholdBounds::default()
            },
            Some(false),
        )
        .expect("rule");
        let outcome = TelemetryIngestor::ingest(&store, &TelemetrySample::new("P1", "pressure", 10.0))
            .expect("ingest");
        assert!(!outcome.alert_created);
        assert_eq!(outcome.rule_state, RuleState::Disabled);
    }

    #[test]
    fn existing_feature_id_and_name_are_kept() {
        let store = TwinStore::in_memory().expect("open");
        let mut first = TelemetrySample::new("P1", "flow", 1.0).for_feature("road-1");
        first.point_name = Some("Inlet".into());
        TelemetryIngestor::ingest(&store, &first).expect("ingest");
        TelemetryIngestor::ingest(&store, &TelemetrySample::new("P1", "pressure", 2.0).for_feature("road-2"))
            .expect("ingest");

        let point: SensorPoint = store
            .read(|s| s.get_as(tables::SENSOR_POINTS, "P1"))
            .expect("read")
            .expect("point");
        assert_eq!(point.feature_id.as_deref(), Some("road-1"));
        assert_eq!(point.point_name, "Inlet");
        assert_eq!(point.point_type, Metric::Pressure);
    }

    #[test]
    fn invalid_sample_writes_nothing() {
        let store = TwinStore::in_memory().expect("open");
        let result = TelemetryIngestor::ingest(&store, &TelemetrySample::new("P1", "temperature", 1.0));
        assert!(matches!(result, Err(TwinError::InvalidMetric(_))));
        assert_eq!(store.stats().expect("stats").sensor_points, 0);
        assert_eq!(store.stats().expect("stats").samples, 0);
    }

    #[test]
    fn uppercase_metric_and_string_value_write_nothing() {
        let store = TwinStore::in_memory().expect("open");

        let text_value: TelemetrySample =
            serde_json::from_value(json!({ "pointId": "P1", "metric": "pressure", "value": "45" }))
                .expect("decode");
        let result = TelemetryIngestor::ingest(&store, &text_value);
        assert!(matches!(result, Err(TwinError::ValueRequired)));

        let upper: TelemetrySample =
            serde_json::from_value(json!({ "pointId": "P1", "metric": "PRESSURE", "value": 45 }))
                .expect("decode");
        let result = TelemetryIngestor::ingest(&store, &upper);
        assert!(matches!(result, Err(TwinError::InvalidMetric(_))));

        let stats = store.stats().expect("stats");
        assert_eq!(stats.sensor_points, 0);
        assert_eq!(stats.samples, 0);
    }

    #[test]
    fn wrongly_typed_fields_get_named_errors() {
        let decode = |body: serde_json::Value| -> TelemetrySample {
            serde_json::from_value(body).expect("decode")
        };

        let numeric_point = decode(json!({ "pointId": 5, "metric": "flow", "value": 1 }));
        assert!(matches!(
            TelemetryIngestor::validate(&numeric_point, now()),
            Err(TwinError::PointIdRequired)
        ));

        let numeric_metric = decode(json!({ "pointId": "P1", "metric": 3, "value": 1 }));
        assert!(matches!(
            TelemetryIngestor::validate(&numeric_metric, now()),
            Err(TwinError::InvalidMetric(_))
        ));

        let numeric_time = decode(json!({ "pointId": "P1", "metric": "flow", "value": 1, "sampledAt": 123 }));
        assert!(matches!(
            TelemetryIngestor::validate(&numeric_time, now()),
            Err(TwinError::InvalidSampledAt(_))
        ));

        let null_time = decode(json!({ "pointId": "P1", "metric": "flow", "value": 1, "sampledAt": null }));
        let valid = TelemetryIngestor::validate(&null_time, now()).expect("valid");
        assert_eq!(valid.sampled_at, now());
    }

    #[test]
    fn threshold_requires_point_and_metric() {
        let store = TwinStore::in_memory().expect("open");
        let blank = TelemetryIngestor::upsert_threshold(&store, " ", "flow", ThresholdBounds::default(), None);
        assert!(matches!(blank, Err(TwinError::PointIdRequired)));
        let bad = TelemetryIngestor::upsert_threshold(&store, "P1", "ph", ThresholdBounds::default(), None);
        assert!(matches!(bad, Err(TwinError::InvalidMetric(_))));
    }
}
