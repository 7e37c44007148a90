//! OEE Math
//!
//! - **math**: availability, performance, quality, oee, trend, average
//! - **status**: OEE classification bands
//! - **inputs**: recomputation from raw production counts
//! - **error**: [`MathError`]

pub mod error;
pub mod inputs;
pub mod math;
pub mod status;

pub use error::{MathError, MathResult};
pub use inputs::{OeeBreakdown, OeeInputs};
pub use math::{availability, average, oee, performance, quality, trend};
pub use status::OeeStatus;
