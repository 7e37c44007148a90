//! Event Bus
//!
//! In-process fan-out of telemetry to interested listeners.
//!
//! ## Architecture
//!
//! ```text
//!   ConnectionManager ──► EventBus ──┬──► TelemetryWindows (machine_update)
//!                                    ├──► OEE listeners     (oee_update)
//!                                    └──► caller listeners  (any topic)
//! ```
//!
//! - **EventBus**: topic → ordered listener registry
//! - **BusEvent**: tagged union of event payloads
//! - **SubscriptionHandle**: receipt used to unsubscribe

mod event;
mod registry;

pub use event::{BusEvent, OeePush, Topic, MACHINE_UPDATE, OEE_UPDATE};
pub use registry::{EventBus, Listener, SubscriptionHandle};
