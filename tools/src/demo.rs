//! Deterministic synthetic scheme for `--demo`.
//!
//! RULE: all randomness comes from one seeded PCG stream, so the same seed
//! always produces the same readings and flags.

use anyhow::Result;
use chrono::{Days, Months, NaiveDate};
use meterwatch_core::{
    cycle::Cycle,
    engine::MeterEngine,
    meter::{Meter, MeterType, Unit, UnitStatus},
    reading::ReadingInput,
    types::{new_id, CycleId, MeterId},
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub const DEMO_SCHEME: &str = "scheme-demo";

/// Share of bulk supply that goes to common areas in a normal month.
const COMMON_AREA_SHARE: f64 = 0.08;
const ANOMALY_CHANCE: f64 = 0.04;

/// A named, seeded stream.
pub struct DemoRng {
    inner: Pcg64Mcg,
}

impl DemoRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn chance(&mut self, p: f64) -> bool {
        self.inner.gen::<f64>() < p
    }

    /// Uniform in [low, high).
    pub fn between(&mut self, low: f64, high: f64) -> f64 {
        self.inner.gen_range(low..high)
    }
}

struct DemoMeter {
    id: MeterId,
    base_kwh: f64,
    register: f64,
}

/// Seed one scheme with a bulk meter, `units` unit meters and `cycles`
/// monthly cycles of readings. All but the last cycle are closed.
pub fn seed_scheme(engine: &MeterEngine, seed: u64, units: usize, cycles: u32) -> Result<Vec<CycleId>> {
    let mut rng = DemoRng::new(seed);

    let bulk = Meter::new(new_id("mtr"), DEMO_SCHEME.into(), None, MeterType::Bulk, "BULK-001");
    engine.store.insert_meter(&bulk)?;
    let mut bulk_register = 10_000.0;

    let mut meters = Vec::with_capacity(units);
    for n in 1..=units {
        let status = if rng.chance(0.1) {
            UnitStatus::Vacant
        } else {
            UnitStatus::Occupied
        };
        let unit = Unit {
            id: new_id("unit"),
            scheme_id: DEMO_SCHEME.into(),
            unit_number: format!("{n:03}"),
            status,
        };
        engine.store.insert_unit(&unit)?;

        let meter = Meter::new(
            new_id("mtr"),
            DEMO_SCHEME.into(),
            Some(unit.id.clone()),
            MeterType::Unit,
            &format!("U-{n:03}"),
        );
        engine.store.insert_meter(&meter)?;
        let base_kwh = match status {
            UnitStatus::Vacant => rng.between(0.0, 5.0),
            UnitStatus::Occupied => rng.between(150.0, 450.0),
        };
        meters.push(DemoMeter {
            id: meter.id,
            base_kwh,
            register: rng.between(1_000.0, 5_000.0).round(),
        });
    }

    let first = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or_else(|| anyhow::anyhow!("bad start date"))?;
    let mut cycle_ids = Vec::with_capacity(cycles as usize);
    for i in 0..cycles {
        let start = first
            .checked_add_months(Months::new(i))
            .ok_or_else(|| anyhow::anyhow!("cycle {i} start out of range"))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|d| d.checked_sub_days(Days::new(1)))
            .ok_or_else(|| anyhow::anyhow!("cycle {i} end out of range"))?;
        let cycle = Cycle::open(new_id("cyc"), DEMO_SCHEME.into(), start, end);
        engine.store.insert_cycle(&cycle)?;

        let mut units_total = 0.0;
        for meter in &mut meters {
            // Skip a few reads so closure readiness has something to report.
            if i > 0 && rng.chance(0.03) {
                continue;
            }
            let mut kwh = (meter.base_kwh * rng.between(0.85, 1.15)).round();
            if rng.chance(ANOMALY_CHANCE) {
                kwh *= rng.between(3.5, 6.0);
            } else if rng.chance(ANOMALY_CHANCE) {
                kwh = 0.0;
            }
            meter.register += kwh.round();
            units_total += kwh.round();
            engine.capture_reading(ReadingInput {
                cycle_id: cycle.id.clone(),
                meter_id: meter.id.clone(),
                reading_value: meter.register,
                reading_date: end,
                captured_by: "demo".into(),
                notes: None,
            })?;
        }

        let share = if rng.chance(0.15) {
            rng.between(0.25, 0.4)
        } else {
            COMMON_AREA_SHARE
        };
        bulk_register += (units_total / (1.0 - share)).round();
        engine.capture_reading(ReadingInput {
            cycle_id: cycle.id.clone(),
            meter_id: bulk.id.clone(),
            reading_value: bulk_register,
            reading_date: end,
            captured_by: "demo".into(),
            notes: None,
        })?;

        if i + 1 < cycles {
            engine.close_cycle(&cycle.id)?;
        }
        cycle_ids.push(cycle.id);
    }

    log::info!("Seeded {DEMO_SCHEME}: {units} units, {cycles} cycles (seed {seed})");
    Ok(cycle_ids)
}
