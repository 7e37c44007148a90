//! Orchestrator error types

use thiserror::Error;

use crate::telemetry::MachineId;
use crate::timerange::TimeRangeSelector;

/// Errors delivered to OEE watchers
///
/// Cloneable so every consumer of a watch receives the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The backend query failed; the refresh timer keeps running
    #[error("OEE query rejected for machine {machine_id} ({selector}): {reason}")]
    QueryRejected {
        machine_id: MachineId,
        selector: TimeRangeSelector,
        reason: String,
    },
}

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
