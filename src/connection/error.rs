//! Connection error types

use thiserror::Error;

use crate::telemetry::MachineId;

/// Errors that can occur talking to the telemetry source
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection refused or lost; the manager retries on its own schedule
    #[error("Transport error: {0}")]
    Transport(String),

    /// `send` was called while no link is established
    #[error("Not connected to telemetry source")]
    NotConnected,

    /// The link went away while sending
    #[error("Connection closed")]
    Closed,

    /// Update for a machine nobody watches; dropped, never escalated
    #[error("Stale subscription: machine {machine_id} has no watcher")]
    StaleSubscription { machine_id: MachineId },

    /// Frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConnectionError::NotConnected.to_string(),
            "Not connected to telemetry source"
        );
        assert_eq!(
            ConnectionError::Transport("refused".to_string()).to_string(),
            "Transport error: refused"
        );
        assert_eq!(
            ConnectionError::StaleSubscription { machine_id: 4 }.to_string(),
            "Stale subscription: machine 4 has no watcher"
        );
    }
}
