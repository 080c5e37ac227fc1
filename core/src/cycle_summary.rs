//! Per-cycle roll-ups consumed by review and close-out screens.
//!
//! Everything here is computed from already-loaded records. Closing a cycle
//! is always allowed; readiness only says whether to warn first.

use crate::{
    flag::Severity,
    meter::{Meter, MeterType},
    reading::{Reading, ReviewStatus},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

/// Auto-flag counts across one cycle's readings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CycleFlagSummary {
    /// Readings in the cycle.
    pub total: usize,
    /// Readings carrying at least one auto flag.
    pub flagged: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_severity: SeverityCounts,
}

impl CycleFlagSummary {
    pub fn from_readings(readings: &[Reading]) -> Self {
        let mut summary = Self {
            total: readings.len(),
            ..Self::default()
        };
        for reading in readings.iter().filter(|r| !r.flags.is_empty()) {
            summary.flagged += 1;
            for flag in &reading.flags {
                *summary.by_type.entry(flag.kind.as_str().to_string()).or_insert(0) += 1;
                summary.by_severity.bump(flag.severity);
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosureReadiness {
    pub total_units: usize,
    pub units_read: usize,
    pub units_not_read: usize,
    /// Whole percent, rounded.
    pub completion_rate: f64,
    pub is_complete: bool,
    pub has_high_flags: bool,
    /// Readings with auto flags still awaiting review.
    pub unreviewed_flags: usize,
    pub should_warn: bool,
}

impl ClosureReadiness {
    /// `meters` is every meter of the scheme; only UNIT meters count towards
    /// completion. A meter read twice in the cycle counts once.
    pub fn assess(meters: &[Meter], readings: &[Reading]) -> Self {
        let unit_meters: HashSet<&str> = meters
            .iter()
            .filter(|m| m.meter_type == MeterType::Unit)
            .map(|m| m.id.as_str())
            .collect();
        let read: HashSet<&str> = readings
            .iter()
            .map(|r| r.meter_id.as_str())
            .filter(|id| unit_meters.contains(id))
            .collect();

        let total_units = unit_meters.len();
        let units_read = read.len();
        let completion_rate = if total_units > 0 {
            (units_read as f64 / total_units as f64 * 100.0).round()
        } else {
            0.0
        };
        let is_complete = units_read == total_units;
        let has_high_flags = readings
            .iter()
            .any(|r| r.flags.iter().any(|f| f.severity == Severity::High));
        let unreviewed_flags = readings
            .iter()
            .filter(|r| !r.flags.is_empty() && r.review_status == ReviewStatus::Pending)
            .count();

        Self {
            total_units,
            units_read,
            units_not_read: total_units - units_read,
            completion_rate,
            is_complete,
            has_high_flags,
            unreviewed_flags,
            should_warn: !is_complete || has_high_flags || unreviewed_flags > 0,
        }
    }
}
