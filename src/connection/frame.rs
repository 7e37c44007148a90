//! Wire frames exchanged with the telemetry source
//!
//! Every frame is a JSON object `{"type": ..., "payload": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ConnectionResult;
use crate::telemetry::MachineId;

/// Outbound control type: start streaming a machine
pub const SUBSCRIBE: &str = "subscribe";
/// Outbound control type: stop streaming a machine
pub const UNSUBSCRIBE: &str = "unsubscribe";

/// One protocol message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Frame {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn subscribe(machine_id: MachineId) -> Self {
        Self::new(SUBSCRIBE, json!({ "machine_id": machine_id }))
    }

    pub fn unsubscribe(machine_id: MachineId) -> Self {
        Self::new(UNSUBSCRIBE, json!({ "machine_id": machine_id }))
    }

    /// Parse a text message
    pub fn decode(text: &str) -> ConnectionResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> ConnectionResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// `payload.machine_id`, if present
    pub fn machine_id(&self) -> Option<MachineId> {
        self.payload
            .get("machine_id")
            .and_then(|v| v.as_u64())
            .and_then(|v| MachineId::try_from(v).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_serialize() {
        let json = serde_json::to_string(&Frame::subscribe(12)).unwrap();
        assert!(json.contains("\"type\":\"subscribe\""));
        assert!(json.contains("\"machine_id\":12"));
    }

    #[test]
    fn test_frame_deserialize() {
        let json = r#"{"type": "machine_update", "payload": {"machine_id": 5, "temperature": 70.1}}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.kind, "machine_update");
        assert_eq!(frame.machine_id(), Some(5));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        use crate::connection::ConnectionError;

        assert!(matches!(Frame::decode("not json"), Err(ConnectionError::Serialization(_))));
        assert!(matches!(Frame::decode(r#"{"payload": {}}"#), Err(ConnectionError::Serialization(_))));
        let text = Frame::unsubscribe(3).encode().unwrap();
        assert_eq!(Frame::decode(&text).unwrap(), Frame::unsubscribe(3));
    }

    #[test]
    fn test_frame_without_payload() {
        let frame: Frame = serde_json::from_str(r#"{"type": "pong"}"#).unwrap();
        assert!(frame.payload.is_null());
        assert_eq!(frame.machine_id(), None);
    }
}
