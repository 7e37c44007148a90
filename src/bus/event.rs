//! Event Bus message types
//!
//! Events are a tagged union; the topic of an event is derived from its
//! variant so a payload can never be published under the wrong topic.

use serde::{Deserialize, Serialize};

use crate::telemetry::{MachineId, OeeReport, TelemetryRecord};

/// Wire name of the machine telemetry topic
pub const MACHINE_UPDATE: &str = "machine_update";
/// Wire name of the OEE push topic
pub const OEE_UPDATE: &str = "oee_update";

/// Named channel of the event bus
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    MachineUpdate,
    OeeUpdate,
    /// Caller-defined topic
    Custom(String),
}

impl Topic {
    pub fn as_str(&self) -> &str {
        match self {
            Topic::MachineUpdate => MACHINE_UPDATE,
            Topic::OeeUpdate => OEE_UPDATE,
            Topic::Custom(name) => name,
        }
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        match name {
            MACHINE_UPDATE => Topic::MachineUpdate,
            OEE_UPDATE => Topic::OeeUpdate,
            other => Topic::Custom(other.to_string()),
        }
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Topic::from(name.as_str())
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OEE figures pushed by the telemetry source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OeePush {
    pub machine_id: MachineId,
    #[serde(flatten)]
    pub report: OeeReport,
}

/// Payload delivered to bus listeners
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// New telemetry for one machine
    MachineUpdate(TelemetryRecord),
    /// New OEE figures for one machine
    OeeUpdate(OeePush),
    /// Caller-defined event; the topic must not name a built-in topic
    Custom {
        topic: String,
        payload: serde_json::Value,
    },
}

impl BusEvent {
    /// Create a caller-defined event
    pub fn custom(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        BusEvent::Custom {
            topic: topic.into(),
            payload,
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::MachineUpdate(_) => Topic::MachineUpdate,
            BusEvent::OeeUpdate(_) => Topic::OeeUpdate,
            BusEvent::Custom { topic, .. } => Topic::from(topic.as_str()),
        }
    }

    /// Machine this event concerns, if any
    pub fn machine_id(&self) -> Option<MachineId> {
        match self {
            BusEvent::MachineUpdate(record) => Some(record.machine_id),
            BusEvent::OeeUpdate(push) => Some(push.machine_id),
            BusEvent::Custom { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_from_str_normalizes_builtins() {
        assert_eq!(Topic::from("machine_update"), Topic::MachineUpdate);
        assert_eq!(Topic::from("oee_update"), Topic::OeeUpdate);
        assert_eq!(Topic::from("alarms"), Topic::Custom("alarms".to_string()));
        assert_eq!(Topic::OeeUpdate.to_string(), "oee_update");
    }

    #[test]
    fn test_event_topic_and_machine() {
        let event = BusEvent::MachineUpdate(TelemetryRecord::new(4));
        assert_eq!(event.topic(), Topic::MachineUpdate);
        assert_eq!(event.machine_id(), Some(4));

        let event = BusEvent::custom("alarms", serde_json::json!({"code": 12}));
        assert_eq!(event.topic(), Topic::Custom("alarms".to_string()));
        assert_eq!(event.machine_id(), None);
    }

    #[test]
    fn test_oee_push_deserialize_flat() {
        let json = r#"{"machine_id": 2, "availability": 0.9, "performance": 0.8,
                       "quality": 1.0, "oee": 0.72}"#;
        let push: OeePush = serde_json::from_str(json).unwrap();
        assert_eq!(push.machine_id, 2);
        assert_eq!(push.report.oee, 0.72);
    }
}
