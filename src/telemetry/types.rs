//! Core data types for shop-floor telemetry
//!
//! - `TelemetryRecord`: one sparse observation from a machine
//! - `MachineStatus`: operating state reported by the operator panel or PLC
//! - `OeeReport` / `OeeSnapshot`: OEE figures as returned by the backend and
//!   as held by the orchestrator
//! - `Machine`: machine descriptor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::oee::OeeStatus;

/// Identifier of a machine on the shop floor
pub type MachineId = u32;

/// Operating state of a machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum MachineStatus {
    Running,
    Idle,
    Stopped,
    Maintenance,
    /// Anything the backend reports that we do not recognize
    Unknown,
}

impl MachineStatus {
    pub fn all() -> &'static [MachineStatus] {
        &[
            MachineStatus::Running,
            MachineStatus::Idle,
            MachineStatus::Stopped,
            MachineStatus::Maintenance,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Running => "running",
            MachineStatus::Idle => "idle",
            MachineStatus::Stopped => "stopped",
            MachineStatus::Maintenance => "maintenance",
            MachineStatus::Unknown => "unknown",
        }
    }

    /// Dashboard colour for this status
    pub fn color(&self) -> &'static str {
        match self {
            MachineStatus::Running => "#10B981",
            MachineStatus::Idle => "#F59E0B",
            MachineStatus::Stopped => "#EF4444",
            MachineStatus::Maintenance => "#3B82F6",
            MachineStatus::Unknown => "#6B7280",
        }
    }
}

impl From<String> for MachineStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => MachineStatus::Running,
            "idle" => MachineStatus::Idle,
            "stopped" => MachineStatus::Stopped,
            "maintenance" => MachineStatus::Maintenance,
            _ => MachineStatus::Unknown,
        }
    }
}

impl From<MachineStatus> for String {
    fn from(value: MachineStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single, possibly sparse, observation from one machine
///
/// Every measurement is optional: a status change carries only `status`,
/// a sensor sample only the sensor field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub machine_id: MachineId,
    /// Arrival time when the source omits it
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_consumption: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_count: Option<u64>,
}

impl TelemetryRecord {
    /// Create an empty record stamped with the current time
    pub fn new(machine_id: MachineId) -> Self {
        Self::with_timestamp(machine_id, Utc::now())
    }

    pub fn with_timestamp(machine_id: MachineId, timestamp: DateTime<Utc>) -> Self {
        Self {
            machine_id,
            timestamp,
            status: None,
            current_consumption: None,
            temperature: None,
            pressure: None,
            cycle_count: None,
        }
    }

    /// Builder: set status
    pub fn status(mut self, status: MachineStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Builder: set current consumption (A)
    pub fn current_consumption(mut self, amps: f64) -> Self {
        self.current_consumption = Some(amps);
        self
    }

    /// Builder: set temperature (°C)
    pub fn temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    /// Builder: set pressure (bar)
    pub fn pressure(mut self, bar: f64) -> Self {
        self.pressure = Some(bar);
        self
    }

    /// Builder: set cycle count
    pub fn cycle_count(mut self, cycles: u64) -> Self {
        self.cycle_count = Some(cycles);
        self
    }

    /// True when no measurement is present
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.current_consumption.is_none()
            && self.temperature.is_none()
            && self.pressure.is_none()
            && self.cycle_count.is_none()
    }
}

/// OEE figures as returned by the backend query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OeeReport {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

/// OEE figures for one machine over one resolved interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OeeSnapshot {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
    /// When the range was resolved for the query that produced this snapshot
    pub computed_at: DateTime<Utc>,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
}

impl OeeSnapshot {
    pub fn from_report(
        report: OeeReport,
        computed_at: DateTime<Utc>,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Self {
        Self {
            availability: report.availability,
            performance: report.performance,
            quality: report.quality,
            oee: report.oee,
            computed_at,
            range_start,
            range_end,
        }
    }

    pub fn status(&self) -> OeeStatus {
        OeeStatus::classify(self.oee)
    }
}

/// Machine descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
    /// Machine family (press, welding, injection, ...)
    #[serde(rename = "type")]
    pub machine_type: String,
    /// Seconds per part at rated speed
    pub ideal_cycle_time: f64,
    #[serde(default = "default_machine_status")]
    pub status: MachineStatus,
}

fn default_machine_status() -> MachineStatus {
    MachineStatus::Stopped
}

/// Production delta handed to the external recorder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionRecord {
    pub machine_id: MachineId,
    pub good_parts: u64,
    pub defective_parts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = TelemetryRecord::new(7)
            .status(MachineStatus::Running)
            .temperature(61.5);

        assert_eq!(record.machine_id, 7);
        assert_eq!(record.status, Some(MachineStatus::Running));
        assert_eq!(record.temperature, Some(61.5));
        assert!(record.pressure.is_none());
        assert!(!record.is_empty());
        assert!(TelemetryRecord::new(7).is_empty());
    }

    #[test]
    fn test_sparse_record_deserialize() {
        let json = r#"{"machine_id": 3, "timestamp": "2024-03-15T10:00:00Z", "pressure": 4.2}"#;
        let record: TelemetryRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.machine_id, 3);
        assert_eq!(record.pressure, Some(4.2));
        assert!(record.status.is_none());
        assert!(record.cycle_count.is_none());
    }

    #[test]
    fn test_record_without_timestamp_gets_arrival_time() {
        let before = Utc::now();
        let record: TelemetryRecord =
            serde_json::from_str(r#"{"machine_id": 1, "status": "idle"}"#).unwrap();

        assert!(record.timestamp >= before);
        assert_eq!(record.status, Some(MachineStatus::Idle));
    }

    #[test]
    fn test_record_serialization_skips_absent_fields() {
        let record = TelemetryRecord::new(2).status(MachineStatus::Stopped);
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"status\":\"stopped\""));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_unknown_status() {
        let status: MachineStatus = serde_json::from_str("\"exploded\"").unwrap();
        assert_eq!(status, MachineStatus::Unknown);
        assert_eq!(MachineStatus::Maintenance.to_string(), "maintenance");
    }

    #[test]
    fn test_machine_deserialize() {
        let json = r#"{"id": 1, "name": "Press 1", "type": "press", "ideal_cycle_time": 2.5,
                       "created_at": "2024-01-01T00:00:00"}"#;
        let machine: Machine = serde_json::from_str(json).unwrap();

        assert_eq!(machine.machine_type, "press");
        assert_eq!(machine.status, MachineStatus::Stopped);
    }

    #[test]
    fn test_snapshot_status() {
        let now = Utc::now();
        let report = OeeReport {
            availability: 0.95,
            performance: 0.95,
            quality: 0.99,
            oee: 0.893,
        };
        let snapshot = OeeSnapshot::from_report(report, now, now, now);
        assert_eq!(snapshot.status(), OeeStatus::WorldClass);
    }
}
