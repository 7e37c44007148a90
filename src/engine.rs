//! Engine context
//!
//! Composition root for the telemetry and OEE core. One [`Engine`] owns the
//! event bus, the connection manager, the telemetry windows and the OEE
//! orchestrator, and is handed explicitly to whatever presents the data.
//!
//! ```text
//!   Transport ──► ConnectionManager ──► EventBus ──┬──► TelemetryWindows
//!                                                  └──► on_topic listeners
//!
//!   watch_oee ──► OeeOrchestrator ──► FactoryApi::get_oee
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use thiserror::Error;

use crate::api::{ApiError, FactoryApi, HttpFactoryApi};
use crate::bus::{BusEvent, EventBus, SubscriptionHandle, Topic};
use crate::config::{Config, ConfigError};
use crate::connection::{
    ConnectionError, ConnectionManager, ConnectionState, ManagerConfig, Transport, WebSocketTransport,
};
use crate::oee::{MathError, OeeBreakdown, OeeInputs};
use crate::orchestrator::{OeeOrchestrator, OeeUpdate, OrchestratorError, WatchGuard, DEFAULT_REFRESH_INTERVAL};
use crate::production::OperatorSession;
use crate::telemetry::{Machine, MachineId, TelemetryRecord};
use crate::timerange::{resolve_now, ResolvedRange, Shift, ShiftSchedule, TimeRangeSelector};
use crate::window::{TelemetryWindows, DEFAULT_CAPACITY};

/// Errors surfaced by the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Query(#[from] OrchestratorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Tunables for [`Engine::new`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub manager: ManagerConfig,
    pub window_capacity: usize,
    pub refresh_interval: Duration,
    pub shifts: ShiftSchedule,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            window_capacity: DEFAULT_CAPACITY,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            shifts: ShiftSchedule::three_shift(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> EngineResult<Self> {
        Ok(Self {
            manager: config.connection.manager_config(),
            window_capacity: config.window.capacity()?,
            refresh_interval: config.orchestrator.refresh_interval(),
            shifts: config.shift_schedule()?,
        })
    }
}

/// The telemetry and OEE engine
pub struct Engine {
    bus: Arc<EventBus>,
    connection: Arc<ConnectionManager>,
    windows: Arc<TelemetryWindows>,
    window_feed: SubscriptionHandle,
    orchestrator: OeeOrchestrator,
    api: Arc<dyn FactoryApi>,
    shifts: ShiftSchedule,
}

impl Engine {
    pub fn new(transport: Arc<dyn Transport>, api: Arc<dyn FactoryApi>, options: EngineOptions) -> Self {
        let bus = Arc::new(EventBus::new());
        let windows = Arc::new(TelemetryWindows::new(options.window_capacity));
        let connection = Arc::new(ConnectionManager::new(transport, Arc::clone(&bus), options.manager));
        // Re-checked under the window lock so a frame racing the last unwatch is not kept
        let watched = Arc::clone(&connection);
        let window_feed = windows.attach(&bus, move |machine_id| watched.is_watched(machine_id));
        let orchestrator = OeeOrchestrator::new(Arc::clone(&api), options.refresh_interval);

        Self {
            bus,
            connection,
            windows,
            window_feed,
            orchestrator,
            api,
            shifts: options.shifts,
        }
    }

    /// Engine over the WebSocket telemetry source and the HTTP backend
    pub fn from_config(config: &Config) -> EngineResult<Self> {
        let transport = Arc::new(WebSocketTransport::new(config.connection.url.clone()));
        let api = Arc::new(HttpFactoryApi::new(config.api.client_config())?);
        Ok(Self::new(transport, api, EngineOptions::from_config(config)?))
    }

    /// Connect to the telemetry source
    pub async fn start(&self) {
        tracing::info!(endpoint = %self.connection.endpoint(), "Starting engine");
        self.connection.connect().await;
    }

    /// Stop OEE refreshes and disconnect
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown();
        self.connection.disconnect().await;
        tracing::info!("Engine stopped");
    }

    // Event bus

    pub fn on_topic<F>(&self, topic: impl Into<Topic>, listener: F) -> SubscriptionHandle
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, listener)
    }

    pub fn off_topic(&self, handle: &SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    // Live telemetry

    /// Start live updates for a machine
    ///
    /// Watchers are counted; only the first one subscribes upstream.
    pub fn watch_machine(&self, machine_id: MachineId) -> bool {
        self.connection.watch_machine(machine_id)
    }

    /// Drop one watcher; the last one out unsubscribes and frees the window
    pub fn unwatch_machine(&self, machine_id: MachineId) -> bool {
        let last = self.connection.unwatch_machine(machine_id);
        if last {
            self.windows.discard(machine_id);
        }
        last
    }

    /// Recent telemetry for a machine, oldest first
    pub fn get_window(&self, machine_id: MachineId) -> Vec<TelemetryRecord> {
        self.windows.get(machine_id)
    }

    pub fn latest(&self, machine_id: MachineId) -> Option<TelemetryRecord> {
        self.windows.latest(machine_id)
    }

    /// Send a raw frame to the telemetry source
    pub fn send(&self, kind: &str, payload: serde_json::Value) -> EngineResult<()> {
        Ok(self.connection.send(kind, payload)?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    // Time ranges

    /// Resolve a selector against the current local time
    pub fn resolve_range(&self, selector: TimeRangeSelector) -> ResolvedRange<Local> {
        resolve_now(selector)
    }

    /// Shift covering the current local time
    pub fn current_shift(&self) -> Option<&Shift> {
        self.shifts.shift_at(&Local::now())
    }

    pub fn shifts(&self) -> &ShiftSchedule {
        &self.shifts
    }

    // OEE

    /// Keep an OEE snapshot current; drop the guard to stop
    pub fn watch_oee<F>(&self, machine_id: MachineId, selector: TimeRangeSelector, on_update: F) -> WatchGuard
    where
        F: Fn(&OeeUpdate) + Send + Sync + 'static,
    {
        self.orchestrator.watch_oee(machine_id, selector, on_update)
    }

    pub fn refresh_oee(&self, machine_id: MachineId, selector: TimeRangeSelector) -> bool {
        self.orchestrator.refresh(machine_id, selector)
    }

    /// OEE from raw counts, for when the backend figures are not enough
    pub fn recompute_oee(&self, inputs: &OeeInputs) -> EngineResult<OeeBreakdown> {
        Ok(inputs.compute()?)
    }

    // Backend

    /// Machines known to the backend, for choosing what to watch
    pub async fn machines(&self) -> EngineResult<Vec<Machine>> {
        Ok(self.api.list_machines().await?)
    }

    pub async fn machine(&self, machine_id: MachineId) -> EngineResult<Machine> {
        Ok(self.api.get_machine(machine_id).await?)
    }

    /// Production counting for an operator at one machine
    pub fn operator_session(&self, machine_id: MachineId) -> OperatorSession {
        OperatorSession::new(Arc::clone(&self.api), machine_id)
    }

    // Components

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn windows(&self) -> &Arc<TelemetryWindows> {
        &self.windows
    }

    pub fn orchestrator(&self) -> &OeeOrchestrator {
        &self.orchestrator
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.window_feed);
    }
}
