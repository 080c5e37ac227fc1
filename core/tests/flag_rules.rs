//! Integration tests for the flag rule set.
//!
//! Rules are exercised directly through `RuleSet::evaluate` with hand-built
//! contexts, so no store is involved.

use chrono::NaiveDate;
use meterwatch_core::{
    config::ValidationConfig,
    flag::{FlagKind, Severity},
    history::{HistoricalSeries, HistoryPoint},
    meter::{Meter, MeterType, Unit, UnitStatus},
    reading::{Reading, ReadingInput},
    rules::{assess_gradual_creep, RuleContext, RuleSet},
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn meter(last_reading: Option<f64>) -> Meter {
    let m = Meter::new("mtr-1".into(), "scheme-1".into(), Some("unit-1".into()), MeterType::Unit, "U-1");
    match last_reading {
        Some(v) => m.with_last_reading(v, Some(date(2025, 3, 31))),
        None => m,
    }
}

fn reading(value: f64, previous: Option<f64>, on: NaiveDate) -> Reading {
    Reading::from_input(
        ReadingInput {
            cycle_id: "cyc-1".into(),
            meter_id: "mtr-1".into(),
            reading_value: value,
            reading_date: on,
            captured_by: "reader".into(),
            notes: None,
        },
        previous,
    )
}

/// Consumptions given most recent first, one month apart, ending March 2025.
fn series(consumptions: &[f64]) -> HistoricalSeries {
    let points = consumptions
        .iter()
        .enumerate()
        .map(|(i, &c)| HistoryPoint {
            reading_id: format!("past-{i}"),
            reading_date: date(2025, 3, 15) - chrono::Months::new(i as u32),
            consumption: c,
            seq: (consumptions.len() - i) as i64,
        })
        .collect();
    HistoricalSeries::new("mtr-1".into(), points)
}

fn evaluate(
    reading: &Reading,
    meter: &Meter,
    unit: Option<&Unit>,
    series: &HistoricalSeries,
    config: &ValidationConfig,
) -> Vec<FlagKind> {
    let ctx = RuleContext {
        reading,
        meter,
        unit,
        series,
        config,
    };
    RuleSet::standard().evaluate(&ctx).into_iter().map(|f| f.kind).collect()
}

fn unit(status: UnitStatus) -> Unit {
    Unit {
        id: "unit-1".into(),
        scheme_id: "scheme-1".into(),
        unit_number: "101".into(),
        status,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Totality and ordering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn rules_are_total_over_empty_inputs() {
    let config = ValidationConfig::default();
    let empty = HistoricalSeries::empty("mtr-1".into());

    // First-ever capture: no previous value, no history, no unit.
    let first = reading(0.0, None, date(2025, 4, 30));
    assert!(evaluate(&first, &meter(None), None, &empty, &config).is_empty());

    // Zero everywhere.
    let zero = reading(0.0, Some(0.0), date(2025, 4, 30));
    let flags = evaluate(&zero, &meter(Some(0.0)), Some(&unit(UnitStatus::Vacant)), &empty, &config);
    assert_eq!(flags, vec![FlagKind::Unchanged]);

    // History made entirely of zeros.
    let zeros = series(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    let flags = evaluate(&zero, &meter(Some(0.0)), None, &zeros, &config);
    assert_eq!(flags, vec![FlagKind::Unchanged]);
}

#[test]
fn standard_rule_order_is_fixed() {
    assert_eq!(
        RuleSet::standard().rule_names(),
        vec![
            "backward",
            "spike",
            "percentage-spike",
            "zero-consumption",
            "unchanged",
            "gradual-creep",
            "seasonal-anomaly",
            "vacancy-contradiction",
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Backward
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn backward_reading_raises_one_high_flag() {
    let config = ValidationConfig::default();
    let r = reading(90.0, Some(100.0), date(2025, 4, 30));
    let ctx = RuleContext {
        reading: &r,
        meter: &meter(Some(100.0)),
        unit: None,
        series: &HistoricalSeries::empty("mtr-1".into()),
        config: &config,
    };
    let flags = RuleSet::standard().evaluate(&ctx);
    let backward: Vec<_> = flags.iter().filter(|f| f.kind == FlagKind::Backward).collect();
    assert_eq!(backward.len(), 1);
    assert_eq!(backward[0].severity, Severity::High);
    assert_eq!(backward[0].message, "Backward reading: 90 < 100");
}

#[test]
fn backward_allowed_silences_the_rule() {
    let config = ValidationConfig {
        backward_allowed: true,
        ..ValidationConfig::default()
    };
    let r = reading(90.0, Some(100.0), date(2025, 4, 30));
    let flags = evaluate(&r, &meter(Some(100.0)), None, &HistoricalSeries::empty("mtr-1".into()), &config);
    assert!(!flags.contains(&FlagKind::Backward));
}

// ─────────────────────────────────────────────────────────────────────────────
// Spike and percentage spike
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn spike_fires_only_strictly_above_the_multiple() {
    let config = ValidationConfig::default();
    let history = series(&[10.0, 10.0, 10.0]);

    let at_limit = reading(1030.0, Some(1000.0), date(2025, 4, 15));
    let flags = evaluate(&at_limit, &meter(Some(1000.0)), None, &history, &config);
    assert!(!flags.contains(&FlagKind::Spike));

    let over = reading(1030.01, Some(1000.0), date(2025, 4, 15));
    let ctx = RuleContext {
        reading: &over,
        meter: &meter(Some(1000.0)),
        unit: None,
        series: &history,
        config: &config,
    };
    let flags = RuleSet::standard().evaluate(&ctx);
    let spike = flags.iter().find(|f| f.kind == FlagKind::Spike).expect("spike flag");
    assert_eq!(spike.severity, Severity::High);
}

#[test]
fn spike_needs_history() {
    let config = ValidationConfig::default();
    let r = reading(5000.0, Some(1000.0), date(2025, 4, 15));
    let flags = evaluate(&r, &meter(Some(1000.0)), None, &HistoricalSeries::empty("mtr-1".into()), &config);
    assert!(!flags.contains(&FlagKind::Spike));
    assert!(!flags.contains(&FlagKind::PercentageSpike));
}

#[test]
fn spike_and_percentage_spike_coexist() {
    let config = ValidationConfig::default();
    // Most recent first: 90 was last cycle.
    let history = series(&[90.0, 110.0, 100.0]);
    let r = reading(1450.0, Some(1000.0), date(2025, 4, 15));
    let flags = evaluate(&r, &meter(Some(1000.0)), None, &history, &config);
    assert_eq!(flags, vec![FlagKind::Spike, FlagKind::PercentageSpike]);
}

#[test]
fn percentage_spike_compares_against_last_cycle_only() {
    let config = ValidationConfig::default();
    // Average is high, but last cycle was 40: 61 is more than 50% up on it.
    let history = series(&[40.0, 200.0, 200.0]);
    let r = reading(1061.0, Some(1000.0), date(2025, 4, 15));
    let flags = evaluate(&r, &meter(Some(1000.0)), None, &history, &config);
    assert_eq!(flags, vec![FlagKind::PercentageSpike]);

    let r = reading(1060.0, Some(1000.0), date(2025, 4, 15));
    let flags = evaluate(&r, &meter(Some(1000.0)), None, &history, &config);
    assert!(flags.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Zero consumption vs unchanged
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unchanged_at_zero_is_not_zero_consumption() {
    let config = ValidationConfig::default();
    let r = reading(0.0, Some(0.0), date(2025, 4, 30));
    let flags = evaluate(&r, &meter(Some(0.0)), None, &HistoricalSeries::empty("mtr-1".into()), &config);
    assert!(flags.contains(&FlagKind::Unchanged));
    assert!(!flags.contains(&FlagKind::ZeroConsumption));
}

#[test]
fn zero_consumption_on_active_meter_raises_both() {
    let config = ValidationConfig::default();
    let r = reading(500.0, Some(500.0), date(2025, 4, 30));
    let flags = evaluate(&r, &meter(Some(500.0)), None, &HistoricalSeries::empty("mtr-1".into()), &config);
    assert_eq!(flags, vec![FlagKind::ZeroConsumption, FlagKind::Unchanged]);

    let tolerant = ValidationConfig {
        zero_tolerance: false,
        ..ValidationConfig::default()
    };
    let flags = evaluate(&r, &meter(Some(500.0)), None, &HistoricalSeries::empty("mtr-1".into()), &tolerant);
    assert_eq!(flags, vec![FlagKind::Unchanged]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Gradual creep
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn steady_climb_is_creep() {
    let history = series(&[150.0, 140.0, 130.0, 120.0, 110.0, 100.0]);
    let creep = assess_gradual_creep(&history, 7.0).expect("creep");
    assert_eq!(creep.cycles, 6);
    assert_eq!(creep.increasing_count, 5);
    assert!(creep.average_increase > 8.0 && creep.average_increase < 9.0);

    let config = ValidationConfig::default();
    let r = reading(1150.0, Some(1000.0), date(2025, 4, 15));
    let flags = evaluate(&r, &meter(Some(1000.0)), None, &history, &config);
    assert!(flags.contains(&FlagKind::GradualCreep));
}

#[test]
fn creep_needs_four_cycles() {
    let history = series(&[300.0, 200.0, 100.0]);
    assert!(assess_gradual_creep(&history, 7.0).is_none());
}

#[test]
fn flat_series_is_not_creep() {
    let history = series(&[100.0, 100.0, 100.0, 100.0, 100.0]);
    assert!(assess_gradual_creep(&history, 7.0).is_none());
}

#[test]
fn creep_respects_configured_threshold() {
    let history = series(&[150.0, 140.0, 130.0, 120.0, 110.0, 100.0]);
    assert!(assess_gradual_creep(&history, 10.0).is_none());
}

#[test]
fn creep_needs_at_least_half_the_transitions_rising() {
    let config = ValidationConfig::default();
    let r = reading(1150.0, Some(1000.0), date(2025, 4, 15));

    // 100 -> 110 falls back, then 100 -> 120 -> 130: two of three rising.
    let two_of_three = series(&[130.0, 120.0, 100.0, 110.0]);
    let creep = assess_gradual_creep(&two_of_three, 7.0).expect("creep");
    assert_eq!(creep.increasing_count, 2);
    assert!(evaluate(&r, &meter(Some(1000.0)), None, &two_of_three, &config).contains(&FlagKind::GradualCreep));

    // One big jump after a decline averages above the threshold but is not a trend.
    let one_of_three = series(&[150.0, 100.0, 110.0, 120.0]);
    assert!(assess_gradual_creep(&one_of_three, 7.0).is_none());
    assert!(!evaluate(&r, &meter(Some(1000.0)), None, &one_of_three, &config).contains(&FlagKind::GradualCreep));
}

// ─────────────────────────────────────────────────────────────────────────────
// Seasonal anomaly
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn seasonal_deviation_above_thirty_percent_fires() {
    let config = ValidationConfig::default();
    let history = HistoricalSeries::new(
        "mtr-1".into(),
        vec![HistoryPoint {
            reading_id: "last-june".into(),
            reading_date: date(2024, 6, 10),
            consumption: 100.0,
            seq: 1,
        }],
    );

    let high = reading(1150.0, Some(1000.0), date(2025, 6, 15));
    let flags = RuleSet::standard().evaluate(&RuleContext {
        reading: &high,
        meter: &meter(Some(1000.0)),
        unit: None,
        series: &history,
        config: &config,
    });
    let seasonal = flags
        .iter()
        .find(|f| f.kind == FlagKind::SeasonalAnomaly)
        .expect("seasonal flag");
    assert_eq!(seasonal.severity, Severity::Low);
    assert!(seasonal.message.starts_with("Higher"));

    let close = reading(1120.0, Some(1000.0), date(2025, 6, 15));
    let flags = evaluate(&close, &meter(Some(1000.0)), None, &history, &config);
    assert!(!flags.contains(&FlagKind::SeasonalAnomaly));
}

#[test]
fn seasonal_window_follows_config() {
    let history = HistoricalSeries::new(
        "mtr-1".into(),
        vec![HistoryPoint {
            reading_id: "six-months-ago".into(),
            reading_date: date(2024, 12, 10),
            consumption: 100.0,
            seq: 1,
        }],
    );
    let r = reading(1050.0, Some(1000.0), date(2025, 6, 15));

    let yearly = ValidationConfig::default();
    assert!(!evaluate(&r, &meter(Some(1000.0)), None, &history, &yearly).contains(&FlagKind::SeasonalAnomaly));

    let half_yearly = ValidationConfig {
        seasonal_comparison_months: 6,
        ..ValidationConfig::default()
    };
    assert!(evaluate(&r, &meter(Some(1000.0)), None, &history, &half_yearly).contains(&FlagKind::SeasonalAnomaly));
}

#[test]
fn seasonal_match_tolerates_one_month_either_side() {
    let config = ValidationConfig::default();
    let r = reading(1150.0, Some(1000.0), date(2025, 6, 15));
    let single = |on: NaiveDate| {
        HistoricalSeries::new(
            "mtr-1".into(),
            vec![HistoryPoint {
                reading_id: "past".into(),
                reading_date: on,
                consumption: 100.0,
                seq: 1,
            }],
        )
    };

    for (on, fires) in [
        (date(2024, 7, 10), true),  // 11 months back
        (date(2024, 5, 10), true),  // 13 months back
        (date(2024, 8, 10), false), // 10 months back
    ] {
        let flags = evaluate(&r, &meter(Some(1000.0)), None, &single(on), &config);
        assert_eq!(flags.contains(&FlagKind::SeasonalAnomaly), fires, "past reading on {on}");
    }
}

#[test]
fn zero_consumption_is_not_a_seasonal_anomaly() {
    let config = ValidationConfig::default();
    let history = HistoricalSeries::new(
        "mtr-1".into(),
        vec![HistoryPoint {
            reading_id: "last-june".into(),
            reading_date: date(2024, 6, 15),
            consumption: 100.0,
            seq: 1,
        }],
    );
    let r = reading(1100.0, Some(1100.0), date(2025, 6, 15));
    let flags = evaluate(&r, &meter(Some(1100.0)), None, &history, &config);
    assert_eq!(flags, vec![FlagKind::ZeroConsumption, FlagKind::Unchanged]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Vacancy contradiction
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn vacant_unit_with_real_consumption_is_flagged() {
    let config = ValidationConfig::default();
    let empty = HistoricalSeries::empty("mtr-1".into());
    let vacant = unit(UnitStatus::Vacant);

    let r = reading(1060.0, Some(1000.0), date(2025, 4, 30));
    let flags = evaluate(&r, &meter(Some(1000.0)), Some(&vacant), &empty, &config);
    assert_eq!(flags, vec![FlagKind::VacancyContradiction]);

    let trickle = reading(1040.0, Some(1000.0), date(2025, 4, 30));
    assert!(evaluate(&trickle, &meter(Some(1000.0)), Some(&vacant), &empty, &config).is_empty());

    let occupied = unit(UnitStatus::Occupied);
    assert!(evaluate(&r, &meter(Some(1000.0)), Some(&occupied), &empty, &config).is_empty());
    assert!(evaluate(&r, &meter(Some(1000.0)), None, &empty, &config).is_empty());
}
