//! Sensor points, samples, threshold rules and alerts.

use super::{Metric, Properties, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw observation as submitted by a caller, before validation.
///
/// Every field is optional so that a missing field surfaces as the named
/// validation error instead of a generic decode failure. The validated
/// fields stay raw JSON so that a wrongly typed value does too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    #[serde(default)]
    pub point_id: Option<Value>,
    #[serde(default)]
    pub feature_id: Option<String>,
    #[serde(default)]
    pub point_name: Option<String>,
    #[serde(default)]
    pub metric: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub sampled_at: Option<Value>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl TelemetrySample {
    #[must_use]
    pub fn new(point_id: &str, metric: &str, value: f64) -> Self {
        Self {
            point_id: Some(Value::from(point_id)),
            metric: Some(Value::from(metric)),
            value: Some(Value::from(value)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_feature(mut self, feature_id: &str) -> Self {
        self.feature_id = Some(feature_id.to_string());
        self
    }

    #[must_use]
    pub fn at(mut self, sampled_at: &str) -> Self {
        self.sampled_at = Some(Value::from(sampled_at));
        self
    }
}

/// One physical measurement point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorPoint {
    pub id: String,
    pub feature_id: Option<String>,
    pub point_name: String,
    pub point_type: Metric,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// A validated observation. History rows are append-only; the latest row per
/// `(pointId, metric)` is overwritten on every ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub point_id: String,
    pub feature_id: Option<String>,
    pub metric: Metric,
    pub value: f64,
    pub unit: Option<String>,
    pub sampled_at: DateTime<Utc>,
    pub quality: String,
    pub source: String,
}

/// Latest-value row; same shape as a history row.
pub type MetricLatest = MetricSample;

/// Warn/alarm bounds of a threshold rule. Absent bounds are never checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdBounds {
    #[serde(default)]
    pub warn_low: Option<f64>,
    #[serde(default)]
    pub warn_high: Option<f64>,
    #[serde(default)]
    pub alarm_low: Option<f64>,
    #[serde(default)]
    pub alarm_high: Option<f64>,
}

/// Per point, per metric alerting rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRule {
    pub point_id: String,
    pub metric: Metric,
    pub warn_low: Option<f64>,
    pub warn_high: Option<f64>,
    pub alarm_low: Option<f64>,
    pub alarm_high: Option<f64>,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl ThresholdRule {
    #[must_use]
    pub fn bounds(&self) -> ThresholdBounds {
        ThresholdBounds {
            warn_low: self.warn_low,
            warn_high: self.warn_high,
            alarm_low: self.alarm_low,
            alarm_high: self.alarm_high,
        }
    }
}

/// An alert raised by the threshold evaluator. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub point_id: String,
    pub feature_id: Option<String>,
    pub metric: Metric,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
    pub threshold_value: f64,
    pub status: String,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
}

/// How the threshold rule for a sample was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleState {
    /// No rule exists for `(pointId, metric)`.
    #[serde(rename = "none")]
    NoRule,
    /// A rule exists but is disabled.
    #[serde(rename = "disabled")]
    Disabled,
    /// An enabled rule was checked.
    #[serde(rename = "evaluated")]
    Evaluated,
}

/// Result of one `ingest` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub ok: bool,
    pub point_id: String,
    pub metric: Metric,
    pub sampled_at: DateTime<Utc>,
    pub alert_created: bool,
    pub severity: Option<Severity>,
    pub threshold_value: Option<f64>,
    pub alert_id: Option<String>,
    pub rule_state: RuleState,
}
