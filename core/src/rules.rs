//! The flag rule set.
//!
//! EVALUATION ORDER (fixed, matches emission order):
//!   1. Backward
//!   2. Spike (average-based)
//!   3. Percentage spike
//!   4. Zero consumption
//!   5. Unchanged
//!   6. Gradual creep
//!   7. Seasonal anomaly
//!   8. Vacancy contradiction
//!
//! RULES:
//!   - Every rule is pure: same context in, same flag out.
//!   - Every rule runs; an earlier flag never suppresses a later one.
//!   - A rule missing the history or linkage it needs returns `None`.
//!   - A reading with no consumption (first capture) is a baseline and
//!     never trips a consumption-based rule.

use crate::{
    config::ValidationConfig,
    flag::{AutoFlag, FlagKind, Severity},
    history::{HistoricalSeries, CREEP_WINDOW},
    meter::{Meter, Unit, UnitStatus},
    reading::Reading,
};

// ── Fixed thresholds ─────────────────────────────────────────────────────────

/// Fewest past readings the creep detector will look at.
pub const CREEP_MIN_CYCLES: usize = 4;
/// Seasonal deviation that is worth a look, independent of config.
pub const SEASONAL_DEVIATION_PERCENT: f64 = 30.0;
/// Consumption on a vacant unit above which occupancy is in doubt (kWh).
pub const VACANCY_CONSUMPTION_KWH: f64 = 50.0;

/// Everything a rule may look at.
pub struct RuleContext<'a> {
    pub reading: &'a Reading,
    /// The meter as it stood before this reading was taken.
    pub meter: &'a Meter,
    /// The meter's unit, when the meter is linked and the unit exists.
    pub unit: Option<&'a Unit>,
    /// Past readings of this meter, most recent first.
    pub series: &'a HistoricalSeries,
    pub config: &'a ValidationConfig,
}

impl RuleContext<'_> {
    fn consumption(&self) -> Option<f64> {
        self.reading.consumption
    }
}

/// The contract every detector fulfils.
pub trait FlagRule: Send + Sync {
    /// Unique stable name, equal to the kind of flag emitted.
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag>;
}

/// An ordered collection of rules.
pub struct RuleSet {
    rules: Vec<Box<dyn FlagRule>>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The eight standard detectors in their documented order.
    pub fn standard() -> Self {
        let mut set = Self::empty();
        set.register(Box::new(BackwardRule));
        set.register(Box::new(SpikeRule));
        set.register(Box::new(PercentageSpikeRule));
        set.register(Box::new(ZeroConsumptionRule));
        set.register(Box::new(UnchangedRule));
        set.register(Box::new(GradualCreepRule));
        set.register(Box::new(SeasonalAnomalyRule));
        set.register(Box::new(VacancyContradictionRule));
        set
    }

    /// Append a rule. Call in the intended evaluation order.
    pub fn register(&mut self, rule: Box<dyn FlagRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule and collect the flags in rule order.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<AutoFlag> {
        let flags: Vec<AutoFlag> = self.rules.iter().filter_map(|r| r.evaluate(ctx)).collect();
        log::debug!(
            "reading={} meter={} history={} flags={:?}",
            ctx.reading.id,
            ctx.meter.id,
            ctx.series.len(),
            flags.iter().map(|f| f.kind.as_str()).collect::<Vec<_>>()
        );
        flags
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

// ── Detectors ────────────────────────────────────────────────────────────────

pub struct BackwardRule;

impl FlagRule for BackwardRule {
    fn name(&self) -> &'static str {
        FlagKind::Backward.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        if ctx.config.backward_allowed {
            return None;
        }
        let last = ctx.meter.last_reading?;
        let value = ctx.reading.reading_value;
        (value < last).then(|| {
            AutoFlag::new(
                FlagKind::Backward,
                Severity::High,
                format!("Backward reading: {value} < {last}"),
                "Reading decreased from previous value. Possible meter rollover or replacement."
                    .into(),
            )
        })
    }
}

pub struct SpikeRule;

impl FlagRule for SpikeRule {
    fn name(&self) -> &'static str {
        FlagKind::Spike.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        let consumption = ctx.consumption()?;
        let average = ctx.series.moving_average(ctx.config.min_history_cycles);
        let multiplier = ctx.config.spike_multiplier;
        if average <= 0.0 || consumption <= average * multiplier {
            return None;
        }
        Some(AutoFlag::new(
            FlagKind::Spike,
            Severity::High,
            format!(
                "Huge spike: {consumption:.2} kWh (avg: {average:.2} kWh, threshold: {multiplier}×)"
            ),
            format!(
                "Consumption exceeds {multiplier}× historical average. May indicate leak or reading error."
            ),
        ))
    }
}

pub struct PercentageSpikeRule;

impl FlagRule for PercentageSpikeRule {
    fn name(&self) -> &'static str {
        FlagKind::PercentageSpike.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        let consumption = ctx.consumption()?;
        let previous = ctx.series.previous_cycle_consumption();
        let threshold = ctx.config.percentage_threshold;
        if previous <= 0.0 || consumption <= previous * (1.0 + threshold / 100.0) {
            return None;
        }
        let increase = (consumption - previous) / previous * 100.0;
        Some(AutoFlag::new(
            FlagKind::PercentageSpike,
            Severity::Medium,
            format!(
                "{increase:.1}% increase from last cycle (was {previous:.2} kWh, now {consumption:.2} kWh)"
            ),
            format!("Consumption increased by more than {threshold}%. Review for accuracy."),
        ))
    }
}

pub struct ZeroConsumptionRule;

impl FlagRule for ZeroConsumptionRule {
    fn name(&self) -> &'static str {
        FlagKind::ZeroConsumption.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        if !ctx.config.zero_tolerance {
            return None;
        }
        let consumption = ctx.consumption()?;
        let was_active = ctx.meter.last_reading.is_some_and(|last| last > 0.0);
        (consumption == 0.0 && was_active).then(|| {
            AutoFlag::new(
                FlagKind::ZeroConsumption,
                Severity::Medium,
                "Zero consumption detected".into(),
                "No electricity used this cycle. Verify unit occupancy and meter status.".into(),
            )
        })
    }
}

pub struct UnchangedRule;

impl FlagRule for UnchangedRule {
    fn name(&self) -> &'static str {
        FlagKind::Unchanged.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        let last = ctx.meter.last_reading?;
        (ctx.reading.reading_value == last).then(|| {
            AutoFlag::new(
                FlagKind::Unchanged,
                Severity::Medium,
                "Reading unchanged from previous cycle".into(),
                "Meter reading identical to last cycle. Check if meter is stuck or reading was not updated."
                    .into(),
            )
        })
    }
}

/// Result of scanning the recent series for a steady climb.
#[derive(Debug, Clone, PartialEq)]
pub struct CreepAssessment {
    pub cycles: usize,
    pub increasing_count: usize,
    pub average_increase: f64,
}

/// Scan up to the last six readings for a steady climb.
///
/// A transition counts as an increase when consumption rose over a positive
/// base. The mean is taken over all transitions, rising or not.
pub fn assess_gradual_creep(series: &HistoricalSeries, threshold_percent: f64) -> Option<CreepAssessment> {
    let recent = series.recent(CREEP_WINDOW);
    if recent.len() < CREEP_MIN_CYCLES {
        return None;
    }

    let transitions = recent.len() - 1;
    let (increasing_count, total_increase) = recent
        .windows(2)
        .map(|pair| (pair[0].consumption, pair[1].consumption))
        .filter(|&(current, previous)| current > previous && previous > 0.0)
        .fold((0usize, 0.0f64), |(count, total), (current, previous)| {
            (count + 1, total + (current - previous) / previous * 100.0)
        });
    let average_increase = total_increase / transitions as f64;

    let mostly_rising = increasing_count as f64 >= transitions as f64 / 2.0;
    (mostly_rising && average_increase >= threshold_percent).then_some(CreepAssessment {
        cycles: recent.len(),
        increasing_count,
        average_increase,
    })
}

pub struct GradualCreepRule;

impl FlagRule for GradualCreepRule {
    fn name(&self) -> &'static str {
        FlagKind::GradualCreep.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        let creep = assess_gradual_creep(ctx.series, ctx.config.gradual_creep_threshold)?;
        Some(AutoFlag::new(
            FlagKind::GradualCreep,
            Severity::Low,
            format!(
                "Gradual increase detected: {:.1}% per cycle over {} cycles",
                creep.average_increase, creep.cycles
            ),
            "Usage consistently increasing. May indicate growing occupancy, new appliances, or developing issue."
                .into(),
        ))
    }
}

pub struct SeasonalAnomalyRule;

impl FlagRule for SeasonalAnomalyRule {
    fn name(&self) -> &'static str {
        FlagKind::SeasonalAnomaly.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        let consumption = ctx.consumption()?;
        let past = ctx
            .series
            .same_season_reading(ctx.reading.reading_date, ctx.config.seasonal_comparison_months)?;
        // Zero use is left to the zero-consumption rule.
        if consumption == 0.0 {
            return None;
        }
        // A zero or negative base has no meaningful percent change.
        if past.consumption <= 0.0 {
            return None;
        }
        let difference = consumption - past.consumption;
        let percent = difference / past.consumption * 100.0;
        if percent.abs() <= SEASONAL_DEVIATION_PERCENT {
            return None;
        }
        let direction = if difference > 0.0 { "Higher" } else { "Lower" };
        Some(AutoFlag::new(
            FlagKind::SeasonalAnomaly,
            Severity::Low,
            format!(
                "{direction} than same period last year by {:.1}%",
                percent.abs()
            ),
            format!(
                "Last year same period: {:.2} kWh. Current: {consumption:.2} kWh.",
                past.consumption
            ),
        ))
    }
}

pub struct VacancyContradictionRule;

impl FlagRule for VacancyContradictionRule {
    fn name(&self) -> &'static str {
        FlagKind::VacancyContradiction.as_str()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<AutoFlag> {
        let unit = ctx.unit?;
        let consumption = ctx.consumption()?;
        (unit.status == UnitStatus::Vacant && consumption > VACANCY_CONSUMPTION_KWH).then(|| {
            AutoFlag::new(
                FlagKind::VacancyContradiction,
                Severity::Medium,
                format!("Unit marked VACANT but consumed {consumption:.2} kWh"),
                "Significant consumption detected in vacant unit. Update occupancy status or investigate unauthorized usage."
                    .into(),
            )
        })
    }
}
