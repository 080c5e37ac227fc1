//! Cycle-level reconciliation of unit consumption against the bulk meter.
//!
//! Design:
//!   - common_kwh       = bulk_kwh − Σ unit_kwh
//!   - mismatch_percent = |common_kwh / bulk_kwh| × 100   (0 unless bulk_kwh > 0)
//!   - mismatch_percent > threshold → bulk-mismatch flag
//!   - Severity bands scale with the configured threshold:
//!       high   above 1.5 × threshold
//!       medium from 0.75 × threshold
//!       low    below that
//!     At the default threshold of 20% the band edges land on 15% and 30%.

use crate::flag::{AutoFlag, FlagKind, Severity};
use serde::{Deserialize, Serialize};

const LOW_BAND_RATIO: f64 = 0.75;
const HIGH_BAND_RATIO: f64 = 1.5;

/// The numbers behind a reconciliation, computed whether or not it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationSummary {
    pub bulk_kwh: f64,
    pub sum_units_kwh: f64,
    pub common_kwh: f64,
    pub mismatch_percent: f64,
    pub threshold_percent: f64,
    pub severity: Severity,
}

impl ReconciliationSummary {
    pub fn exceeds_threshold(&self) -> bool {
        self.mismatch_percent > self.threshold_percent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationFlag {
    #[serde(flatten)]
    pub flag: AutoFlag,
    pub details: ReconciliationSummary,
}

pub fn mismatch_severity(mismatch_percent: f64, threshold_percent: f64) -> Severity {
    if mismatch_percent > threshold_percent * HIGH_BAND_RATIO {
        Severity::High
    } else if mismatch_percent >= threshold_percent * LOW_BAND_RATIO {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn summarize(bulk_kwh: f64, unit_kwh: &[f64], threshold_percent: f64) -> ReconciliationSummary {
    let sum_units_kwh: f64 = unit_kwh.iter().sum();
    let common_kwh = bulk_kwh - sum_units_kwh;
    let mismatch_percent = if bulk_kwh > 0.0 {
        (common_kwh / bulk_kwh * 100.0).abs()
    } else {
        0.0
    };
    ReconciliationSummary {
        bulk_kwh,
        sum_units_kwh,
        common_kwh,
        mismatch_percent,
        threshold_percent,
        severity: mismatch_severity(mismatch_percent, threshold_percent),
    }
}

/// Turn a summary into a flag when the mismatch is over threshold.
pub fn flag_for(summary: ReconciliationSummary) -> Option<ReconciliationFlag> {
    if !summary.exceeds_threshold() {
        return None;
    }
    let flag = AutoFlag::new(
        FlagKind::BulkMismatch,
        summary.severity,
        format!(
            "Bulk reconciliation issue: {:.1}% discrepancy",
            summary.mismatch_percent
        ),
        format!(
            "Bulk meter: {:.2} kWh, Sum of units: {:.2} kWh, Common area: {:.2} kWh ({:.1}%)",
            summary.bulk_kwh, summary.sum_units_kwh, summary.common_kwh, summary.mismatch_percent
        ),
    );
    Some(ReconciliationFlag {
        flag,
        details: summary,
    })
}
