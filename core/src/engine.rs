//! The validation engine: the single entry point callers use.
//!
//! CAPTURE ORDER (fixed):
//!   1. Load the meter (unknown meter is the only capture error)
//!   2. Derive consumption from the meter's last register value
//!   3. Resolve config for the meter's scheme
//!   4. Run the rule set against the meter's history
//!   5. Persist the reading, then advance `meter.last_reading`
//!   6. Record the event
//!
//! RULES:
//!   - The engine never executes SQL; it calls store methods.
//!   - Config is read only through the injected `ConfigStore`.
//!   - Auto flags are replaced wholesale; manual flags are only ever
//!     appended or removed one at a time.
//!   - Missing linkage (unit, cycle, bulk meter) means fewer flags or a
//!     `None` summary, never an error.
//!   - Every state change is recorded in the event log.

use crate::{
    config::{resolve_config, ConfigScope, ConfigStore, MemoryConfigStore, PartialValidationConfig, ValidationConfig},
    cycle::{Cycle, CycleStatus},
    cycle_summary::{ClosureReadiness, CycleFlagSummary},
    error::{MeterError, MeterResult},
    event::{EventLogEntry, MeterEvent},
    flag::{AutoFlag, ManualFlagInput, TaggedFlag},
    health::SchemeHealth,
    history::{HistoricalSeries, HistoryPoint},
    meter::{Meter, MeterType},
    reading::{Reading, ReadingInput, ReviewOutcome},
    reconciliation::{self, ReconciliationFlag, ReconciliationSummary},
    rules::{RuleContext, RuleSet},
    store::MeterStore,
};
use chrono::{NaiveDate, Utc};

pub struct MeterEngine {
    pub store: MeterStore,
    config_store: Box<dyn ConfigStore>,
    rules: RuleSet,
}

impl MeterEngine {
    pub fn new(store: MeterStore, config_store: Box<dyn ConfigStore>) -> Self {
        Self {
            store,
            config_store,
            rules: RuleSet::standard(),
        }
    }

    /// Migrated in-memory store with an in-memory config store.
    /// Used by tests and the demo.
    pub fn in_memory() -> MeterResult<Self> {
        let store = MeterStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, Box::new(MemoryConfigStore::new())))
    }

    // ── Configuration ──────────────────────────────────────────

    pub fn resolve_config(&self, scheme_id: Option<&str>) -> ValidationConfig {
        resolve_config(self.config_store.as_ref(), scheme_id)
    }

    pub fn set_config(&self, scope: &ConfigScope, partial: &PartialValidationConfig) -> MeterResult<()> {
        self.config_store.set(scope, partial)
    }

    // ── History ────────────────────────────────────────────────

    /// Past readings of a meter with a known consumption, most recent first.
    pub fn history(&self, meter_id: &str) -> MeterResult<HistoricalSeries> {
        let points = self.store.consumption_history(meter_id)?;
        Ok(HistoricalSeries::new(meter_id.to_string(), points))
    }

    pub fn moving_average(&self, meter_id: &str, window: usize) -> MeterResult<f64> {
        Ok(self.history(meter_id)?.moving_average(window))
    }

    pub fn previous_cycle_consumption(&self, meter_id: &str) -> MeterResult<f64> {
        Ok(self.history(meter_id)?.previous_cycle_consumption())
    }

    pub fn same_season_reading(
        &self,
        meter_id: &str,
        current_date: NaiveDate,
        months_back: u32,
    ) -> MeterResult<Option<HistoryPoint>> {
        Ok(self
            .history(meter_id)?
            .same_season_reading(current_date, months_back)
            .cloned())
    }

    // ── Validation ─────────────────────────────────────────────

    /// Run the full rule set for `reading` against `meter` as it stood
    /// before the reading. Pure with respect to stored state: nothing is
    /// written.
    pub fn validate_reading(&self, reading: &Reading, meter: &Meter) -> MeterResult<Vec<AutoFlag>> {
        let captured_as = self.store.reading_seq(&reading.id)?;
        let series = self.history(&meter.id)?.before(reading.reading_date, captured_as);
        let unit = match &meter.unit_id {
            Some(unit_id) => self.store.get_unit(unit_id)?,
            None => None,
        };
        let config = self.resolve_config(Some(&meter.scheme_id));

        let ctx = RuleContext {
            reading,
            meter,
            unit: unit.as_ref(),
            series: &series,
            config: &config,
        };
        Ok(self.rules.evaluate(&ctx))
    }

    /// Capture a new reading: compute consumption, flag it, persist it and
    /// advance the meter's last reading.
    pub fn capture_reading(&self, input: ReadingInput) -> MeterResult<Reading> {
        let meter = self
            .store
            .get_meter(&input.meter_id)?
            .ok_or_else(|| MeterError::MeterNotFound {
                meter_id: input.meter_id.clone(),
            })?;

        let mut reading = Reading::from_input(input, meter.last_reading);
        match self.store.get_cycle(&reading.cycle_id)? {
            Some(cycle) => reading.late = cycle.is_closed(),
            None => log::warn!(
                "Reading for meter {} references unknown cycle {}",
                meter.id,
                reading.cycle_id
            ),
        }
        reading.flags = self.validate_reading(&reading, &meter)?;

        self.store.insert_reading(&reading)?;
        self.store
            .update_meter_last_reading(&meter.id, reading.reading_value, reading.reading_date)?;

        self.record(MeterEvent::ReadingCaptured {
            reading_id: reading.id.clone(),
            meter_id: reading.meter_id.clone(),
            cycle_id: reading.cycle_id.clone(),
            consumption: reading.consumption,
            flag_count: reading.flags.len(),
            late: reading.late,
        })?;
        Ok(reading)
    }

    /// Re-run the rules on a stored reading and replace its auto flags.
    /// Returns `None` when the reading does not exist.
    pub fn revalidate_reading(&self, reading_id: &str) -> MeterResult<Option<Reading>> {
        let Some(mut reading) = self.store.get_reading(reading_id)? else {
            return Ok(None);
        };
        let meter = self
            .store
            .get_meter(&reading.meter_id)?
            .ok_or_else(|| MeterError::MeterNotFound {
                meter_id: reading.meter_id.clone(),
            })?;

        let at_capture = meter.as_of_capture(reading.previous_reading);
        reading.consumption = reading.effective_consumption();
        reading.flags = self.validate_reading(&reading, &at_capture)?;
        self.store.update_reading_flags(&reading.id, &reading.flags)?;

        self.record(MeterEvent::ReadingRevalidated {
            reading_id: reading.id.clone(),
            flag_count: reading.flags.len(),
        })?;
        Ok(Some(reading))
    }

    // ── Manual flags and review ────────────────────────────────

    /// Append an administrator flag. Returns false for an unknown reading.
    pub fn add_manual_flag(&self, reading_id: &str, input: ManualFlagInput) -> MeterResult<bool> {
        if !self.store.reading_exists(reading_id)? {
            return Ok(false);
        }
        let flag = input.into_flag(Utc::now());
        self.store.insert_manual_flag(reading_id, &flag)?;
        self.record(MeterEvent::ManualFlagAdded {
            reading_id: reading_id.to_string(),
            flag_type: flag.flag_type.clone(),
            added_by: flag.added_by.clone(),
        })?;
        Ok(true)
    }

    /// Remove the manual flag at `index`. Returns false when the reading or
    /// the index does not exist.
    pub fn remove_manual_flag(&self, reading_id: &str, index: usize) -> MeterResult<bool> {
        let removed = self.store.delete_manual_flag_at(reading_id, index)?;
        if removed {
            self.record(MeterEvent::ManualFlagRemoved {
                reading_id: reading_id.to_string(),
                index,
            })?;
        }
        Ok(removed)
    }

    /// Auto flags followed by manual flags, each tagged with its source.
    pub fn all_flags(&self, reading_id: &str) -> MeterResult<Option<Vec<TaggedFlag>>> {
        Ok(self.store.get_reading(reading_id)?.map(|r| r.all_flags()))
    }

    pub fn review_reading(
        &self,
        reading_id: &str,
        outcome: ReviewOutcome,
        reviewed_by: &str,
        notes: Option<String>,
    ) -> MeterResult<Reading> {
        let mut reading = self
            .store
            .get_reading(reading_id)?
            .ok_or_else(|| MeterError::ReadingNotFound {
                reading_id: reading_id.to_string(),
            })?;
        reading.apply_review(outcome, reviewed_by, notes, Utc::now())?;
        self.store.update_reading_review(&reading)?;

        self.record(MeterEvent::ReviewRecorded {
            reading_id: reading.id.clone(),
            review_status: reading.review_status.as_str().to_string(),
            reviewed_by: reviewed_by.to_string(),
        })?;
        Ok(reading)
    }

    // ── Cycle level ────────────────────────────────────────────

    /// The bulk-versus-units numbers for a cycle, whether or not they breach
    /// the threshold. `None` when the cycle is unknown, the scheme does not
    /// have exactly one bulk meter, or the bulk meter has no consumption in
    /// the cycle.
    pub fn reconciliation_summary(&self, cycle_id: &str) -> MeterResult<Option<ReconciliationSummary>> {
        let Some(cycle) = self.store.get_cycle(cycle_id)? else {
            return Ok(None);
        };
        let bulk_meters = self.store.meters_for_scheme(&cycle.scheme_id, Some(MeterType::Bulk))?;
        let bulk = match bulk_meters.as_slice() {
            [bulk] => bulk,
            [] => return Ok(None),
            several => {
                log::warn!(
                    "Scheme {} has {} bulk meters; skipping reconciliation for cycle {cycle_id}",
                    cycle.scheme_id,
                    several.len()
                );
                return Ok(None);
            }
        };

        let readings = self.store.readings_for_cycle(cycle_id)?;
        let Some(bulk_kwh) = readings
            .iter()
            .find(|r| r.meter_id == bulk.id)
            .and_then(|r| r.consumption)
        else {
            return Ok(None);
        };

        let unit_meters: Vec<String> = self
            .store
            .meters_for_scheme(&cycle.scheme_id, Some(MeterType::Unit))?
            .into_iter()
            .map(|m| m.id)
            .collect();
        let unit_kwh: Vec<f64> = readings
            .iter()
            .filter(|r| unit_meters.contains(&r.meter_id))
            .filter_map(|r| r.consumption)
            .collect();

        let config = self.resolve_config(Some(&cycle.scheme_id));
        Ok(Some(reconciliation::summarize(
            bulk_kwh,
            &unit_kwh,
            config.bulk_mismatch_threshold,
        )))
    }

    /// Flag a cycle whose unit consumption does not add up to the bulk meter.
    /// Read-only; the mismatch is logged when the cycle is closed.
    pub fn check_bulk_reconciliation(&self, cycle_id: &str) -> MeterResult<Option<ReconciliationFlag>> {
        Ok(self.reconciliation_summary(cycle_id)?.and_then(reconciliation::flag_for))
    }

    /// UNIT meters of the cycle's scheme with no reading in the cycle.
    pub fn missing_readings(&self, cycle_id: &str) -> MeterResult<Vec<Meter>> {
        let Some(cycle) = self.store.get_cycle(cycle_id)? else {
            return Ok(Vec::new());
        };
        let readings = self.store.readings_for_cycle(cycle_id)?;
        let missing = self
            .store
            .meters_for_scheme(&cycle.scheme_id, Some(MeterType::Unit))?
            .into_iter()
            .filter(|m| !readings.iter().any(|r| r.meter_id == m.id))
            .collect();
        Ok(missing)
    }

    pub fn cycle_flag_summary(&self, cycle_id: &str) -> MeterResult<CycleFlagSummary> {
        let readings = self.store.readings_for_cycle(cycle_id)?;
        Ok(CycleFlagSummary::from_readings(&readings))
    }

    pub fn closure_readiness(&self, cycle_id: &str) -> MeterResult<Option<ClosureReadiness>> {
        let Some(cycle) = self.store.get_cycle(cycle_id)? else {
            return Ok(None);
        };
        let meters = self.store.meters_for_scheme(&cycle.scheme_id, None)?;
        let readings = self.store.readings_for_cycle(cycle_id)?;
        Ok(Some(ClosureReadiness::assess(&meters, &readings)))
    }

    /// OPEN → CLOSED. Always allowed on an open cycle, warnings or not.
    pub fn close_cycle(&self, cycle_id: &str) -> MeterResult<Cycle> {
        let mut cycle = self
            .store
            .get_cycle(cycle_id)?
            .ok_or_else(|| MeterError::CycleNotFound {
                cycle_id: cycle_id.to_string(),
            })?;
        if let Some(readiness) = self.closure_readiness(cycle_id)? {
            if readiness.should_warn {
                log::warn!(
                    "Closing cycle {cycle_id} with {}/{} units read, {} unreviewed flagged readings",
                    readiness.units_read,
                    readiness.total_units,
                    readiness.unreviewed_flags
                );
            }
        }
        cycle.close(Utc::now())?;
        let mismatch = self.check_bulk_reconciliation(cycle_id)?;
        self.store.update_cycle_status(&cycle)?;
        log::info!("Cycle {cycle_id} closed");

        if let Some(f) = mismatch {
            log::warn!(
                "Cycle {cycle_id} closed with {:.1}% bulk mismatch ({})",
                f.details.mismatch_percent,
                f.details.severity
            );
            self.record(MeterEvent::BulkMismatchDetected {
                cycle_id: cycle.id.clone(),
                mismatch_percent: f.details.mismatch_percent,
                severity: f.details.severity,
            })?;
        }

        self.record(MeterEvent::CycleClosed {
            cycle_id: cycle.id.clone(),
        })?;
        Ok(cycle)
    }

    pub fn scheme_health(&self, scheme_id: &str) -> MeterResult<SchemeHealth> {
        let meters = self.store.meters_for_scheme(scheme_id, None)?;
        let cycles = self.store.cycles_for_scheme(scheme_id, None)?;
        let health = SchemeHealth::assess(scheme_id, &meters, &cycles);
        for warning in &health.warnings {
            log::warn!("Scheme {scheme_id}: {warning}");
        }
        Ok(health)
    }

    /// The scheme's open cycle, if exactly one is open.
    pub fn open_cycle(&self, scheme_id: &str) -> MeterResult<Option<Cycle>> {
        let mut open = self.store.cycles_for_scheme(scheme_id, Some(CycleStatus::Open))?;
        Ok(if open.len() == 1 { open.pop() } else { None })
    }

    // ── Event log ──────────────────────────────────────────────

    fn record(&self, event: MeterEvent) -> MeterResult<()> {
        let entry = EventLogEntry::from_event(&event, Utc::now())?;
        self.store.append_event(&entry)
    }
}
