//! Integration tests for reading capture, re-validation and review.
//!
//! Every test drives `MeterEngine::in_memory()`: a migrated in-memory SQLite
//! store plus an in-memory config store.

use chrono::NaiveDate;
use meterwatch_core::{
    cycle::Cycle,
    engine::MeterEngine,
    error::MeterError,
    flag::{FlagKind, Severity},
    meter::{Meter, MeterType},
    reading::{Reading, ReadingInput, ReviewOutcome, ReviewStatus},
};

const SCHEME: &str = "scheme-cap";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine with one unit meter (register at `start`) and one open cycle.
fn setup(start: Option<f64>) -> (MeterEngine, Meter, Cycle) {
    let engine = MeterEngine::in_memory().expect("in-memory engine");
    let mut meter = Meter::new("mtr-1".into(), SCHEME.into(), None, MeterType::Unit, "U-001");
    if let Some(v) = start {
        meter = meter.with_last_reading(v, Some(date(2024, 12, 31)));
    }
    engine.store.insert_meter(&meter).unwrap();
    let cycle = Cycle::open("cyc-1".into(), SCHEME.into(), date(2025, 1, 1), date(2025, 12, 31));
    engine.store.insert_cycle(&cycle).unwrap();
    (engine, meter, cycle)
}

fn capture(engine: &MeterEngine, cycle_id: &str, value: f64, on: NaiveDate) -> Reading {
    engine
        .capture_reading(ReadingInput {
            cycle_id: cycle_id.into(),
            meter_id: "mtr-1".into(),
            reading_value: value,
            reading_date: on,
            captured_by: "reader".into(),
            notes: None,
        })
        .expect("capture")
}

fn kinds(reading: &Reading) -> Vec<FlagKind> {
    reading.flags.iter().map(|f| f.kind).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Capture
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn first_capture_is_a_baseline() {
    let (engine, _, cycle) = setup(None);
    let r = capture(&engine, &cycle.id, 1234.0, date(2025, 1, 31));
    assert_eq!(r.previous_reading, None);
    assert_eq!(r.consumption, None);
    assert!(r.flags.is_empty());

    let meter = engine.store.get_meter("mtr-1").unwrap().unwrap();
    assert_eq!(meter.last_reading, Some(1234.0));
    assert_eq!(meter.last_reading_date, Some(date(2025, 1, 31)));
}

#[test]
fn capture_flags_spike_and_percentage_spike() {
    let (engine, _, cycle) = setup(Some(700.0));
    capture(&engine, &cycle.id, 800.0, date(2025, 1, 31)); // 100
    capture(&engine, &cycle.id, 910.0, date(2025, 2, 28)); // 110
    capture(&engine, &cycle.id, 1000.0, date(2025, 3, 31)); // 90

    let r = capture(&engine, &cycle.id, 1450.0, date(2025, 4, 30));
    assert_eq!(r.consumption, Some(450.0));
    assert_eq!(kinds(&r), vec![FlagKind::Spike, FlagKind::PercentageSpike]);
    assert_eq!(r.flags[0].severity, Severity::High);
    assert_eq!(r.flags[1].severity, Severity::Medium);

    let stored = engine.store.get_reading(&r.id).unwrap().unwrap();
    assert_eq!(stored, r);
}

#[test]
fn unknown_meter_is_an_error() {
    let (engine, _, cycle) = setup(None);
    let err = engine
        .capture_reading(ReadingInput {
            cycle_id: cycle.id.clone(),
            meter_id: "no-such-meter".into(),
            reading_value: 1.0,
            reading_date: date(2025, 1, 31),
            captured_by: String::new(),
            notes: None,
        })
        .unwrap_err();
    assert!(matches!(err, MeterError::MeterNotFound { .. }));
}

#[test]
fn unknown_cycle_still_captures() {
    let (engine, _, _) = setup(Some(100.0));
    let r = capture(&engine, "cyc-missing", 150.0, date(2025, 1, 31));
    assert_eq!(r.consumption, Some(50.0));
    assert!(!r.late);
}

#[test]
fn capture_against_closed_cycle_is_late() {
    let (engine, _, cycle) = setup(Some(100.0));
    engine.close_cycle(&cycle.id).unwrap();
    let r = capture(&engine, &cycle.id, 150.0, date(2025, 1, 31));
    assert!(r.late);
    assert!(engine.store.get_reading(&r.id).unwrap().unwrap().late);
}

#[test]
fn capture_is_recorded_in_event_log() {
    let (engine, _, cycle) = setup(Some(100.0));
    let r = capture(&engine, &cycle.id, 150.0, date(2025, 1, 31));
    let events = engine.store.events_for_subject(&r.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "reading_captured");
    assert!(events[0].payload.contains("\"flag_count\":0"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Idempotence and re-validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn validation_is_idempotent() {
    let (engine, _, cycle) = setup(Some(700.0));
    capture(&engine, &cycle.id, 800.0, date(2025, 1, 31));
    capture(&engine, &cycle.id, 910.0, date(2025, 2, 28));
    capture(&engine, &cycle.id, 1000.0, date(2025, 3, 31));
    let r = capture(&engine, &cycle.id, 1450.0, date(2025, 4, 30));

    let meter = engine.store.get_meter("mtr-1").unwrap().unwrap();
    let at_capture = meter.as_of_capture(r.previous_reading);
    let first = engine.validate_reading(&r, &at_capture).unwrap();
    let second = engine.validate_reading(&r, &at_capture).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, r.flags);
}

#[test]
fn revalidation_reproduces_capture_flags() {
    let (engine, _, cycle) = setup(Some(700.0));
    capture(&engine, &cycle.id, 800.0, date(2025, 1, 31));
    capture(&engine, &cycle.id, 910.0, date(2025, 2, 28));
    capture(&engine, &cycle.id, 1000.0, date(2025, 3, 31));
    let spike = capture(&engine, &cycle.id, 1450.0, date(2025, 4, 30));
    // A later reading must not leak into the earlier reading's history.
    capture(&engine, &cycle.id, 1450.0, date(2025, 5, 31));

    let revalidated = engine.revalidate_reading(&spike.id).unwrap().unwrap();
    assert_eq!(revalidated.flags, spike.flags);

    let again = engine.revalidate_reading(&spike.id).unwrap().unwrap();
    assert_eq!(again.flags, revalidated.flags);
    assert_eq!(engine.store.event_count("reading_revalidated").unwrap(), 2);
}

#[test]
fn same_day_recapture_does_not_leak_into_earlier_reading() {
    let (engine, _, cycle) = setup(Some(700.0));
    capture(&engine, &cycle.id, 800.0, date(2025, 1, 31));
    capture(&engine, &cycle.id, 900.0, date(2025, 2, 28));
    capture(&engine, &cycle.id, 1000.0, date(2025, 3, 31));
    let first = capture(&engine, &cycle.id, 1100.0, date(2025, 4, 30));
    // Corrected re-read on the same day: consumption 5.
    let second = capture(&engine, &cycle.id, 1105.0, date(2025, 4, 30));
    assert!(first.flags.is_empty());
    assert!(second.flags.is_empty());

    let revalidated = engine.revalidate_reading(&first.id).unwrap().unwrap();
    assert_eq!(revalidated.flags, first.flags);
    let revalidated = engine.revalidate_reading(&second.id).unwrap().unwrap();
    assert_eq!(revalidated.flags, second.flags);
}

#[test]
fn revalidation_picks_up_new_config() {
    use meterwatch_core::config::{ConfigScope, PartialValidationConfig};

    let (engine, _, cycle) = setup(Some(700.0));
    capture(&engine, &cycle.id, 800.0, date(2025, 1, 31));
    capture(&engine, &cycle.id, 910.0, date(2025, 2, 28));
    capture(&engine, &cycle.id, 1000.0, date(2025, 3, 31));
    let r = capture(&engine, &cycle.id, 1450.0, date(2025, 4, 30));
    assert!(kinds(&r).contains(&FlagKind::Spike));

    engine
        .set_config(
            &ConfigScope::Scheme(SCHEME.into()),
            &PartialValidationConfig {
                spike_multiplier: Some(5.0),
                ..Default::default()
            },
        )
        .unwrap();
    let revalidated = engine.revalidate_reading(&r.id).unwrap().unwrap();
    assert_eq!(kinds(&revalidated), vec![FlagKind::PercentageSpike]);
}

#[test]
fn revalidating_unknown_reading_is_none() {
    let (engine, _, _) = setup(None);
    assert!(engine.revalidate_reading("rdg-missing").unwrap().is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Review outcomes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn estimate_replaces_consumption_and_survives_revalidation() {
    let (engine, _, cycle) = setup(Some(1000.0));
    let r = capture(&engine, &cycle.id, 900.0, date(2025, 1, 31));
    assert_eq!(r.consumption, Some(-100.0));
    assert_eq!(kinds(&r), vec![FlagKind::Backward]);

    let reviewed = engine
        .review_reading(
            &r.id,
            ReviewOutcome::Estimated { value: 120.0 },
            "admin",
            Some("meter replaced".into()),
        )
        .unwrap();
    assert_eq!(reviewed.review_status, ReviewStatus::Estimated);
    assert_eq!(reviewed.estimated_value, Some(120.0));
    assert_eq!(reviewed.consumption, Some(120.0));
    assert_eq!(reviewed.reviewed_by.as_deref(), Some("admin"));
    assert_eq!(reviewed.admin_notes.as_deref(), Some("meter replaced"));
    assert!(reviewed.reviewed_at.is_some());

    let revalidated = engine.revalidate_reading(&r.id).unwrap().unwrap();
    assert_eq!(revalidated.consumption, Some(120.0));
    // The register still went backwards.
    assert_eq!(kinds(&revalidated), vec![FlagKind::Backward]);

    let stored = engine.store.get_reading(&r.id).unwrap().unwrap();
    assert_eq!(stored.consumption, Some(120.0));
    assert_eq!(stored.review_status, ReviewStatus::Estimated);
}

#[test]
fn approving_after_estimate_restores_register_consumption() {
    let (engine, _, cycle) = setup(Some(1000.0));
    let r = capture(&engine, &cycle.id, 1100.0, date(2025, 1, 31));
    engine
        .review_reading(&r.id, ReviewOutcome::Estimated { value: 80.0 }, "admin", None)
        .unwrap();
    let approved = engine
        .review_reading(&r.id, ReviewOutcome::Approved, "admin", None)
        .unwrap();
    assert_eq!(approved.review_status, ReviewStatus::Approved);
    assert_eq!(approved.estimated_value, None);
    assert_eq!(approved.consumption, Some(100.0));
}

#[test]
fn review_errors() {
    let (engine, _, cycle) = setup(Some(1000.0));
    let err = engine
        .review_reading("rdg-missing", ReviewOutcome::Approved, "admin", None)
        .unwrap_err();
    assert!(matches!(err, MeterError::ReadingNotFound { .. }));

    let r = capture(&engine, &cycle.id, 1100.0, date(2025, 1, 31));
    let err = engine
        .review_reading(&r.id, ReviewOutcome::Estimated { value: f64::NAN }, "admin", None)
        .unwrap_err();
    assert!(matches!(err, MeterError::MissingEstimate));
    assert_eq!(engine.store.event_count("review_recorded").unwrap(), 0);
}

#[test]
fn vacancy_uses_the_stored_unit() {
    use meterwatch_core::meter::{Unit, UnitStatus};

    let engine = MeterEngine::in_memory().unwrap();
    engine
        .store
        .insert_unit(&Unit {
            id: "unit-7".into(),
            scheme_id: SCHEME.into(),
            unit_number: "007".into(),
            status: UnitStatus::Occupied,
        })
        .unwrap();
    let meter = Meter::new("mtr-1".into(), SCHEME.into(), Some("unit-7".into()), MeterType::Unit, "U-007")
        .with_last_reading(100.0, None);
    engine.store.insert_meter(&meter).unwrap();

    let occupied = capture(&engine, "cyc-1", 180.0, date(2025, 1, 31));
    assert!(occupied.flags.is_empty());

    assert!(engine.store.set_unit_status("unit-7", UnitStatus::Vacant).unwrap());
    let vacant = capture(&engine, "cyc-1", 260.0, date(2025, 2, 28));
    assert_eq!(kinds(&vacant), vec![FlagKind::VacancyContradiction]);
}
