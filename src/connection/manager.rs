//! Connection Manager
//!
//! Owns the single logical link to the telemetry source.
//!
//! ```text
//!   Disconnected ──connect()──► Connecting ──open ok──► Connected
//!        ▲                                                 │ link dropped
//!        │ disconnect()                                    ▼
//!        └──────────────────────────────────────────── Reconnecting ──open ok──► Connected
//! ```
//!
//! The remote side forgets subscriptions whenever the link drops, so the
//! manager keeps the subscription intent (machine id → watcher count) and
//! replays one `subscribe` per machine every time it enters `Connected`.
//! Subscribe/unsubscribe traffic is only emitted on 0→1 and 1→0 watcher
//! transitions.
//!
//! `send` while not connected fails fast with [`ConnectionError::NotConnected`].
//! Subscription traffic never goes through that path, so nothing needed for
//! correctness is lost while disconnected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::error::{ConnectionError, ConnectionResult};
use super::frame::Frame;
use super::transport::{Transport, TransportLink};
use crate::bus::{BusEvent, EventBus, OeePush, SubscriptionHandle, Topic, MACHINE_UPDATE, OEE_UPDATE};
use crate::telemetry::{MachineId, TelemetryRecord};

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Reconnect policy
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Delay before the first retry
    pub reconnect_initial: Duration,
    /// Upper bound for the exponential backoff
    pub reconnect_max: Duration,
    /// Consecutive failed attempts before giving up (0 = never give up)
    pub max_reconnect_attempts: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(1000),
            reconnect_max: Duration::from_millis(30_000),
            max_reconnect_attempts: 0,
        }
    }
}

impl ManagerConfig {
    /// `initial * 2^attempt`, capped at `reconnect_max`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.reconnect_initial
            .checked_mul(factor)
            .unwrap_or(self.reconnect_max)
            .min(self.reconnect_max)
    }
}

/// State shared between callers and the link task
struct Inner {
    /// Machine id → number of active watchers
    intents: HashMap<MachineId, usize>,
    /// Present only while connected
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

/// Running link task and its stop signal
struct LinkTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Manages the connection to the telemetry source
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    config: ManagerConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
    task: tokio::sync::Mutex<Option<LinkTask>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, bus: Arc<EventBus>, config: ManagerConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            transport,
            bus,
            config,
            inner: Mutex::new(Inner {
                intents: HashMap::new(),
                outbound: None,
            }),
            state_tx,
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Start the link task
    ///
    /// Returns immediately; watch [`ConnectionManager::state`] or use
    /// [`ConnectionManager::wait_for_state`] to observe progress. Calling
    /// `connect` while a link task is running is a no-op.
    pub async fn connect(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                return;
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.run(shutdown_rx).await;
        });

        *task = Some(LinkTask { shutdown, handle });
    }

    /// Stop the link task and close the link
    ///
    /// Idempotent. Subscription intents are kept and replayed on the next
    /// `connect`.
    pub async fn disconnect(&self) {
        let running = self.task.lock().await.take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            let _ = running.handle.await;
            tracing::info!(endpoint = %self.transport.endpoint(), "Disconnected from telemetry source");
        }
        self.lock_inner().outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Send a frame on the current link
    pub fn send(&self, kind: &str, payload: serde_json::Value) -> ConnectionResult<()> {
        let inner = self.lock_inner();
        let outbound = inner.outbound.as_ref().ok_or(ConnectionError::NotConnected)?;
        outbound
            .send(Frame::new(kind, payload))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Register interest in a machine's live updates
    ///
    /// Returns `true` if this was the first watcher, in which case a
    /// `subscribe` frame is sent (or deferred until the next connect).
    pub fn watch_machine(&self, machine_id: MachineId) -> bool {
        let mut inner = self.lock_inner();
        let count = inner.intents.entry(machine_id).or_insert(0);
        *count += 1;
        if *count > 1 {
            return false;
        }

        if let Some(outbound) = inner.outbound.as_ref() {
            if outbound.send(Frame::subscribe(machine_id)).is_err() {
                tracing::debug!(machine_id, "Subscribe deferred, link is closing");
            }
        }
        tracing::debug!(machine_id, "Machine watched");
        true
    }

    /// Drop one watcher of a machine
    ///
    /// Returns `true` if this was the last watcher, in which case an
    /// `unsubscribe` frame is sent when connected. Unknown machines are a
    /// no-op.
    pub fn unwatch_machine(&self, machine_id: MachineId) -> bool {
        let mut inner = self.lock_inner();
        let Some(count) = inner.intents.get_mut(&machine_id) else {
            return false;
        };

        *count -= 1;
        if *count > 0 {
            return false;
        }
        inner.intents.remove(&machine_id);

        if let Some(outbound) = inner.outbound.as_ref() {
            let _ = outbound.send(Frame::unsubscribe(machine_id));
        }
        tracing::debug!(machine_id, "Machine unwatched");
        true
    }

    /// Machines with at least one watcher, sorted
    pub fn intents(&self) -> Vec<MachineId> {
        let mut ids: Vec<MachineId> = self.lock_inner().intents.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of watchers of a machine
    pub fn watcher_count(&self, machine_id: MachineId) -> usize {
        self.lock_inner().intents.get(&machine_id).copied().unwrap_or(0)
    }

    pub fn is_watched(&self, machine_id: MachineId) -> bool {
        self.watcher_count(machine_id) > 0
    }

    fn ensure_watched(&self, machine_id: MachineId) -> ConnectionResult<()> {
        if self.is_watched(machine_id) {
            Ok(())
        } else {
            Err(ConnectionError::StaleSubscription { machine_id })
        }
    }

    /// Register a bus listener
    pub fn on<F>(&self, topic: impl Into<Topic>, listener: F) -> SubscriptionHandle
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(topic, listener)
    }

    /// Remove a bus listener
    pub fn off(&self, handle: &SubscriptionHandle) -> bool {
        self.bus.unsubscribe(handle)
    }

    /// Where the transport connects to
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state change
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Wait until the manager reaches `target`
    pub async fn wait_for_state(&self, target: ConnectionState) -> ConnectionResult<()> {
        let mut rx = self.state_tx.subscribe();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| ConnectionError::Closed)
    }

    /// Link task: open, pump, reopen with backoff until shut down
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        let mut first = true;

        'outer: loop {
            self.set_state(if first {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            first = false;

            let opened = tokio::select! {
                result = self.transport.open() => result,
                _ = shutdown.changed() => break 'outer,
            };

            match opened {
                Ok(TransportLink {
                    outbound,
                    mut inbound,
                }) => {
                    attempt = 0;
                    self.on_connected(outbound);

                    loop {
                        tokio::select! {
                            frame = inbound.recv() => match frame {
                                Some(frame) => self.route(frame),
                                None => break,
                            },
                            _ = shutdown.changed() => break 'outer,
                        }
                    }

                    self.lock_inner().outbound = None;
                    tracing::warn!(
                        endpoint = %self.transport.endpoint(),
                        "Telemetry link dropped, reconnecting"
                    );
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        endpoint = %self.transport.endpoint(),
                        attempt,
                        error = %e,
                        "Connection attempt failed"
                    );

                    let max = self.config.max_reconnect_attempts;
                    if max > 0 && attempt >= max {
                        tracing::error!(attempts = attempt, "Max reconnect attempts reached");
                        break 'outer;
                    }
                }
            }

            let delay = self.config.backoff(attempt.saturating_sub(1));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break 'outer,
            }
        }

        self.lock_inner().outbound = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Install the link and replay every subscription intent
    fn on_connected(&self, outbound: mpsc::UnboundedSender<Frame>) {
        {
            let mut inner = self.lock_inner();
            let mut ids: Vec<MachineId> = inner.intents.keys().copied().collect();
            ids.sort_unstable();

            for machine_id in &ids {
                if outbound.send(Frame::subscribe(*machine_id)).is_err() {
                    tracing::debug!(machine_id, "Link closed during subscription replay");
                    break;
                }
            }
            inner.outbound = Some(outbound);

            tracing::info!(
                endpoint = %self.transport.endpoint(),
                resubscribed = ids.len(),
                "Connected to telemetry source"
            );
        }
        self.set_state(ConnectionState::Connected);
    }

    /// Translate an inbound frame into a bus event
    fn route(&self, frame: Frame) {
        let kind = frame.kind.clone();
        let event = match decode_event(frame) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(kind = %kind, "Unrecognized frame dropped");
                return;
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Malformed payload dropped");
                return;
            }
        };

        if let Some(machine_id) = event.machine_id() {
            if let Err(e) = self.ensure_watched(machine_id) {
                tracing::debug!(topic = %event.topic(), error = %e, "Update dropped");
                return;
            }
        }

        self.bus.publish(&event);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = %current, to = %state, "Connection state changed");
            *current = state;
            true
        });
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Bus event carried by a frame; `None` for frame types the bus does not know
fn decode_event(frame: Frame) -> ConnectionResult<Option<BusEvent>> {
    let event = match frame.kind.as_str() {
        MACHINE_UPDATE => BusEvent::MachineUpdate(serde_json::from_value::<TelemetryRecord>(frame.payload)?),
        OEE_UPDATE => BusEvent::OeeUpdate(serde_json::from_value::<OeePush>(frame.payload)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}
