//! Connection to the telemetry source
//!
//! ## Architecture
//!
//! - **ConnectionManager**: link lifecycle, subscription intents, inbound routing
//! - **Transport**: opens duplex links ([`WebSocketTransport`] in production)
//! - **Frame**: `{type, payload}` wire message
//!
//! ```text
//!   source ══ws══► WebSocketTransport ──Frame──► ConnectionManager ──BusEvent──► EventBus
//!          ◄═════                     ◄─subscribe/unsubscribe──
//! ```

mod error;
mod frame;
mod manager;
mod transport;
mod websocket;

pub use error::{ConnectionError, ConnectionResult};
pub use frame::{Frame, SUBSCRIBE, UNSUBSCRIBE};
pub use manager::{ConnectionManager, ConnectionState, ManagerConfig};
pub use transport::{Transport, TransportLink};
pub use websocket::WebSocketTransport;
