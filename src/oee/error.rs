//! OEE math error types

use thiserror::Error;

/// Errors raised by the ratio functions in [`crate::oee::math`]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// The ratio's denominator was zero, so the metric is unavailable
    #[error("{metric} is undefined: denominator is zero")]
    DivisionByZero {
        /// Name of the metric that could not be computed
        metric: &'static str,
    },
}

impl MathError {
    pub(crate) fn division_by_zero(metric: &'static str) -> Self {
        MathError::DivisionByZero { metric }
    }
}

/// Result type alias for OEE math
pub type MathResult<T> = Result<T, MathError>;
