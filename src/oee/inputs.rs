//! Local OEE recomputation from raw counts
//!
//! When the raw production figures are at hand, the same ratio contracts the
//! backend uses can be applied locally.

use serde::{Deserialize, Serialize};

use super::error::MathResult;
use super::math;
use super::status::OeeStatus;

/// Raw production figures for one machine over one interval
///
/// Times share a single unit; `ideal_cycle_time` is time per part.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OeeInputs {
    pub planned_production_time: f64,
    pub downtime: f64,
    pub ideal_cycle_time: f64,
    pub total_parts: u64,
    pub good_parts: u64,
}

/// The three factors and their product
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OeeBreakdown {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

impl OeeInputs {
    /// Time the machine was actually available to run
    pub fn operating_time(&self) -> f64 {
        self.planned_production_time - self.downtime
    }

    /// Compute all factors; fails on the first undefined ratio
    pub fn compute(&self) -> MathResult<OeeBreakdown> {
        let availability = math::availability(self.planned_production_time, self.downtime)?;
        let performance = math::performance(
            self.ideal_cycle_time,
            self.total_parts as f64,
            self.operating_time(),
        )?;
        let quality = math::quality(self.good_parts, self.total_parts)?;

        Ok(OeeBreakdown {
            availability,
            performance,
            quality,
            oee: math::oee(availability, performance, quality),
        })
    }
}

impl OeeBreakdown {
    pub fn status(&self) -> OeeStatus {
        OeeStatus::classify(self.oee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oee::MathError;

    #[test]
    fn test_compute_breakdown() {
        let inputs = OeeInputs {
            planned_production_time: 480.0,
            downtime: 60.0,
            ideal_cycle_time: 1.0,
            total_parts: 378,
            good_parts: 340,
        };

        let breakdown = inputs.compute().unwrap();
        assert_eq!(breakdown.availability, 0.875);
        assert!((breakdown.performance - 0.9).abs() < 1e-9);
        assert!((breakdown.quality - 340.0 / 378.0).abs() < 1e-9);
        assert!((breakdown.oee - 0.875 * 0.9 * (340.0 / 378.0)).abs() < 1e-9);
        assert_eq!(breakdown.status(), OeeStatus::Good);
    }

    #[test]
    fn test_compute_without_parts_is_undefined() {
        let inputs = OeeInputs {
            planned_production_time: 480.0,
            downtime: 0.0,
            ideal_cycle_time: 1.0,
            total_parts: 0,
            good_parts: 0,
        };

        assert_eq!(
            inputs.compute(),
            Err(MathError::DivisionByZero { metric: "quality" })
        );
    }

    #[test]
    fn test_compute_full_downtime() {
        let inputs = OeeInputs {
            planned_production_time: 480.0,
            downtime: 480.0,
            ideal_cycle_time: 1.0,
            total_parts: 10,
            good_parts: 10,
        };

        assert_eq!(
            inputs.compute(),
            Err(MathError::DivisionByZero { metric: "performance" })
        );
    }
}
