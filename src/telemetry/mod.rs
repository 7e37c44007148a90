//! Telemetry data model
//!
//! Types shared by the bus, the telemetry windows, the orchestrator and the
//! backend API client.

pub mod format;
pub mod types;

pub use types::{
    Machine, MachineId, MachineStatus, OeeReport, OeeSnapshot, ProductionRecord, TelemetryRecord,
};
