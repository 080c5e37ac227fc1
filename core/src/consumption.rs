//! Consumption arithmetic.

/// Consumption between two register values.
///
/// `None` when there is no previous value: this is the meter's first-ever
/// capture and the reading is a baseline, not a comparison point.
/// A negative result is returned as-is; the backward rule deals with it.
pub fn calculate_consumption(current: f64, previous: Option<f64>) -> Option<f64> {
    previous.map(|prev| current - prev)
}
