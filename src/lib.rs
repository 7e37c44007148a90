//! # Shopfloor
//!
//! Real-time shop-floor telemetry fan-out and OEE computation engine.
//!
//! ## Features
//!
//! - **Live telemetry**: one reconnecting link to the telemetry source, with
//!   per-machine subscription intents replayed on every reconnect
//! - **Event bus**: in-process topic fan-out with isolated listeners
//! - **Bounded history**: the last 100 records per machine
//! - **OEE**: periodic, coalesced OEE queries over `today`, `shift` or `week`,
//!   plus the availability/performance/quality math for local recomputation
//!
//! ## Modules
//!
//! - [`bus`]: Event bus
//! - [`connection`]: Connection manager and transports
//! - [`window`]: Per-machine telemetry windows
//! - [`timerange`]: Time range resolver and shift schedule
//! - [`oee`]: OEE math
//! - [`orchestrator`]: OEE query orchestrator
//! - [`api`]: Factory backend client
//! - [`engine`]: Composition root
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shopfloor::{Config, Engine, TimeRangeSelector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::from_config(&Config::load_default())?;
//!     engine.start().await;
//!
//!     // Live telemetry for machine 1
//!     engine.watch_machine(1);
//!
//!     // OEE for today, refreshed every five minutes
//!     let _guard = engine.watch_oee(1, TimeRangeSelector::Today, |update| match update {
//!         Ok(snapshot) => println!("OEE {:.1}%", snapshot.oee * 100.0),
//!         Err(e) => eprintln!("{}", e),
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     println!("{} records seen", engine.get_window(1).len());
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bus;
pub mod config;
pub mod connection;
pub mod engine;
pub mod oee;
pub mod orchestrator;
pub mod production;
pub mod telemetry;
pub mod timerange;
pub mod window;

// Re-export top-level types for convenience
pub use api::{ApiError, ApiResult, FactoryApi, FactoryApiConfig, HttpFactoryApi};

pub use bus::{BusEvent, EventBus, OeePush, SubscriptionHandle, Topic, MACHINE_UPDATE, OEE_UPDATE};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};

pub use connection::{
    ConnectionError, ConnectionManager, ConnectionResult, ConnectionState, Frame, ManagerConfig,
    Transport, TransportLink, WebSocketTransport,
};

pub use engine::{Engine, EngineError, EngineOptions, EngineResult};

pub use oee::{
    availability, average, oee, performance, quality, trend, MathError, MathResult, OeeBreakdown,
    OeeInputs, OeeStatus,
};

pub use orchestrator::{OeeOrchestrator, OeeUpdate, OrchestratorError, WatchGuard};

pub use production::{OperatorSession, ProductionTally};

pub use telemetry::{
    Machine, MachineId, MachineStatus, OeeReport, OeeSnapshot, ProductionRecord, TelemetryRecord,
};

pub use timerange::{resolve, resolve_now, ResolvedRange, Shift, ShiftSchedule, TimeRangeSelector};

pub use window::TelemetryWindows;
