//! Scheme setup health.
//!
//! RULE: soft invariants are reported, never enforced. A scheme with two bulk
//! meters or no open cycle still validates readings; it just gets warnings.

use crate::{
    cycle::{Cycle, CycleStatus},
    meter::Meter,
    types::{MeterId, SchemeId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateMeterNumber {
    pub meter_number: String,
    pub meter_ids: Vec<MeterId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemeHealth {
    pub scheme_id: SchemeId,
    pub bulk_meter_count: usize,
    pub unit_meter_count: usize,
    pub open_cycle_count: usize,
    pub duplicate_meter_numbers: Vec<DuplicateMeterNumber>,
    pub warnings: Vec<String>,
}

impl SchemeHealth {
    pub fn assess(scheme_id: &str, meters: &[Meter], cycles: &[Cycle]) -> Self {
        let bulk_meter_count = meters.iter().filter(|m| m.is_bulk()).count();
        let unit_meter_count = meters.len() - bulk_meter_count;
        let open_cycle_count = cycles.iter().filter(|c| c.status == CycleStatus::Open).count();
        let duplicate_meter_numbers = duplicate_meter_numbers(meters);

        let mut warnings = Vec::new();
        match bulk_meter_count {
            1 => {}
            0 => warnings.push("No bulk meter registered; reconciliation is unavailable".to_string()),
            n => warnings.push(format!("{n} bulk meters registered; expected exactly one")),
        }
        match open_cycle_count {
            1 => {}
            0 => warnings.push("No open reading cycle".to_string()),
            n => warnings.push(format!("{n} open reading cycles; expected exactly one")),
        }
        for dup in &duplicate_meter_numbers {
            warnings.push(format!(
                "Meter number {} is used by {} meters",
                dup.meter_number,
                dup.meter_ids.len()
            ));
        }

        Self {
            scheme_id: scheme_id.to_string(),
            bulk_meter_count,
            unit_meter_count,
            open_cycle_count,
            duplicate_meter_numbers,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Meter numbers shared by more than one meter, in meter-number order.
pub fn duplicate_meter_numbers(meters: &[Meter]) -> Vec<DuplicateMeterNumber> {
    let mut by_number: BTreeMap<&str, Vec<MeterId>> = BTreeMap::new();
    for meter in meters {
        by_number
            .entry(meter.meter_number.as_str())
            .or_default()
            .push(meter.id.clone());
    }
    by_number
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(number, meter_ids)| DuplicateMeterNumber {
            meter_number: number.to_string(),
            meter_ids,
        })
        .collect()
}
