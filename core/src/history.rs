//! Historical consumption series for a single meter.
//!
//! A series holds only readings with a known consumption, ordered most
//! recent first. Aggregates over an empty series return the "no basis"
//! sentinel (0 or `None`) rather than failing.

use crate::types::{MeterId, ReadingId};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Readings considered by the creep detector.
pub const CREEP_WINDOW: usize = 6;

/// One past reading's contribution to the series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub reading_id: ReadingId,
    pub reading_date: NaiveDate,
    pub consumption: f64,
    /// Capture order within the meter's readings (the store rowid).
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    pub meter_id: MeterId,
    points: Vec<HistoryPoint>,
}

impl HistoricalSeries {
    /// Build a series, sorting by reading date descending. Same-day points
    /// are ordered latest capture first.
    pub fn new(meter_id: MeterId, mut points: Vec<HistoryPoint>) -> Self {
        points.sort_by(|a, b| (b.reading_date, b.seq).cmp(&(a.reading_date, a.seq)));
        Self { meter_id, points }
    }

    pub fn empty(meter_id: MeterId) -> Self {
        Self {
            meter_id,
            points: Vec::new(),
        }
    }

    /// The series as it stood when a reading dated `date` was captured.
    ///
    /// Later dates are dropped. On the same date only points captured before
    /// `captured_as` survive; `None` means the reading is not stored yet, so
    /// every same-day point came first.
    pub fn before(&self, date: NaiveDate, captured_as: Option<i64>) -> Self {
        let points = self
            .points
            .iter()
            .filter(|p| match (p.reading_date.cmp(&date), captured_as) {
                (std::cmp::Ordering::Less, _) => true,
                (std::cmp::Ordering::Equal, Some(seq)) => p.seq < seq,
                (std::cmp::Ordering::Equal, None) => true,
                (std::cmp::Ordering::Greater, _) => false,
            })
            .cloned()
            .collect();
        Self {
            meter_id: self.meter_id.clone(),
            points,
        }
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The `n` most recent points (fewer if the series is shorter).
    pub fn recent(&self, n: usize) -> &[HistoryPoint] {
        &self.points[..n.min(self.points.len())]
    }

    /// Mean consumption over the most recent `window` points.
    ///
    /// Returns 0 for an empty series. Callers treat 0 as "no basis for
    /// comparison", not as a genuine zero average.
    pub fn moving_average(&self, window: usize) -> f64 {
        let recent = self.recent(window);
        if recent.is_empty() {
            return 0.0;
        }
        recent.iter().map(|p| p.consumption).sum::<f64>() / recent.len() as f64
    }

    /// Consumption of the most recent prior reading, or 0 if there is none.
    pub fn previous_cycle_consumption(&self) -> f64 {
        self.points.first().map_or(0.0, |p| p.consumption)
    }

    /// The most recent point dated within ±1 calendar month of exactly
    /// `months_back` months before `current_date`.
    pub fn same_season_reading(
        &self,
        current_date: NaiveDate,
        months_back: u32,
    ) -> Option<&HistoryPoint> {
        let current = month_index(current_date);
        let target = i64::from(months_back);
        self.points.iter().find(|p| {
            let diff = (current - month_index(p.reading_date)).abs();
            diff >= target - 1 && diff <= target + 1
        })
    }
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}
