//! # Threshold Evaluator
//!
//! Static range checks. Bounds are tested in a fixed priority order and the
//! first match wins:
//!
//! | order | bound       | test           | severity   |
//! |-------|-------------|----------------|------------|
//! | 1     | `alarmLow`  | value <= bound | `critical` |
//! | 2     | `alarmHigh` | value >= bound | `critical` |
//! | 3     | `warnLow`   | value <= bound | `warning`  |
//! | 4     | `warnHigh`  | value >= bound | `warning`  |
//!
//! Bounds are inclusive. Absent bounds are skipped.

use crate::types::{Severity, ThresholdBounds};

/// A matched bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breach {
    pub severity: Severity,
    pub threshold_value: f64,
}

#[derive(Clone, Copy)]
enum Side {
    Low,
    High,
}

/// Evaluate `value` against `bounds`. Returns `None` when no bound matches.
#[must_use]
pub fn evaluate(bounds: &ThresholdBounds, value: f64) -> Option<Breach> {
    let checks = [
        (bounds.alarm_low, Side::Low, Severity::Critical),
        (bounds.alarm_high, Side::High, Severity::Critical),
        (bounds.warn_low, Side::Low, Severity::Warning),
        (bounds.warn_high, Side::High, Severity::Warning),
    ];
    checks.into_iter().find_map(|(bound, side, severity)| {
        let bound = bound?;
        let hit = match side {
            Side::Low => value <= bound,
            Side::High => value >= bound,
        };
        hit.then_some(Breach {
            severity,
            threshold_value: bound,
        })
    })
}
