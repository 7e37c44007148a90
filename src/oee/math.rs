//! Efficiency ratio functions
//!
//! Pure functions over plain numbers. A ratio whose denominator is zero is
//! reported as [`MathError::DivisionByZero`], never coerced to `0.0`.
//! The two series helpers ([`trend`] and [`average`]) return a neutral `0.0`
//! when there is not enough history, which is a valid "no data" answer.

use super::error::{MathError, MathResult};

/// Fraction of planned production time left after downtime
///
/// `(planned - downtime) / planned`. Both arguments share a unit (seconds,
/// minutes, ...).
pub fn availability(planned_production_time: f64, downtime: f64) -> MathResult<f64> {
    if planned_production_time == 0.0 {
        return Err(MathError::division_by_zero("availability"));
    }
    Ok((planned_production_time - downtime) / planned_production_time)
}

/// Actual output relative to the capacity implied by the ideal cycle time
///
/// `ideal_production = operating_time / ideal_cycle_time`, result is
/// `total_production / ideal_production`.
pub fn performance(ideal_cycle_time: f64, total_production: f64, operating_time: f64) -> MathResult<f64> {
    if ideal_cycle_time == 0.0 {
        return Err(MathError::division_by_zero("performance"));
    }
    let ideal_production = operating_time / ideal_cycle_time;
    if ideal_production == 0.0 {
        return Err(MathError::division_by_zero("performance"));
    }
    Ok(total_production / ideal_production)
}

/// Fraction of produced units that are good
///
/// Zero total parts means "no data yet" and is reported as an error so the
/// caller does not render it as 0% quality.
pub fn quality(good_parts: u64, total_parts: u64) -> MathResult<f64> {
    if total_parts == 0 {
        return Err(MathError::division_by_zero("quality"));
    }
    Ok(good_parts as f64 / total_parts as f64)
}

/// Composite OEE = availability × performance × quality
///
/// Inputs are not clamped; out-of-range factors show up in the result.
pub fn oee(availability: f64, performance: f64, quality: f64) -> f64 {
    availability * performance * quality
}

/// Percentage change from the first to the last value of a series
///
/// Fewer than two values yields `0.0` (no trend). A zero first value has no
/// defined relative change and is reported as an error.
pub fn trend(series: &[f64]) -> MathResult<f64> {
    let (first, last) = match (series.first(), series.last()) {
        (Some(first), Some(last)) if series.len() >= 2 => (*first, *last),
        _ => return Ok(0.0),
    };
    if first == 0.0 {
        return Err(MathError::division_by_zero("trend"));
    }
    Ok((last - first) / first * 100.0)
}

/// Arithmetic mean; an empty series yields `0.0`
pub fn average(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}
