//! OEE watches and their refresh timers

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::error::OrchestratorError;
use crate::api::{ApiResult, FactoryApi};
use crate::telemetry::{MachineId, OeeReport, OeeSnapshot};
use crate::timerange::{resolve_now, ResolvedRange, TimeRangeSelector};

/// Refresh cadence unless configured otherwise
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// What a watcher receives on every refresh
pub type OeeUpdate = Result<OeeSnapshot, OrchestratorError>;

/// Identity of a watch: one timer and one cached snapshot per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub machine_id: MachineId,
    pub selector: TimeRangeSelector,
}

impl std::fmt::Display for WatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.machine_id, self.selector)
    }
}

struct Consumer {
    id: Uuid,
    active: AtomicBool,
    callback: Box<dyn Fn(&OeeUpdate) + Send + Sync>,
}

impl Consumer {
    fn notify(&self, key: &WatchKey, update: &OeeUpdate) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| (self.callback)(update))).is_err() {
            tracing::error!(watch = %key, consumer_id = %self.id, "OEE consumer panicked");
        }
    }
}

struct Flight {
    /// Generation of the watch that issued the query
    owner: Uuid,
    /// Newer watch for the same key waiting for this query to end
    successor: Option<Arc<Watch>>,
}

/// Outstanding queries, at most one per key
///
/// Outlives individual watches so a key that is unwatched and watched again
/// while its query is still running does not get a second one.
#[derive(Default)]
struct InFlight {
    queries: Mutex<HashMap<WatchKey, Flight>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashMap<WatchKey, Flight>> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn contains(&self, key: &WatchKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Release the key; returns the watch that asked to run next
    fn finish(&self, key: &WatchKey) -> Option<Arc<Watch>> {
        self.lock().remove(key).and_then(|flight| flight.successor)
    }
}

/// Shared state of one (machine, selector) watch
struct Watch {
    key: WatchKey,
    generation: Uuid,
    consumers: Mutex<Vec<Arc<Consumer>>>,
    latest: Mutex<Option<OeeSnapshot>>,
    in_flight: Arc<InFlight>,
    /// Cleared on teardown; late responses check it before applying
    alive: AtomicBool,
}

impl Watch {
    fn new(key: WatchKey, in_flight: Arc<InFlight>) -> Self {
        Self {
            key,
            generation: Uuid::new_v4(),
            consumers: Mutex::new(Vec::new()),
            latest: Mutex::new(None),
            in_flight,
            alive: AtomicBool::new(true),
        }
    }

    fn consumers(&self) -> MutexGuard<'_, Vec<Arc<Consumer>>> {
        self.consumers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn latest(&self) -> MutexGuard<'_, Option<OeeSnapshot>> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a query unless one is already outstanding
    fn trigger(self: &Arc<Self>, api: &Arc<dyn FactoryApi>) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut queries = self.in_flight.lock();
            match queries.get_mut(&self.key) {
                Some(flight) if flight.owner == self.generation => {
                    tracing::debug!(watch = %self.key, "Refresh coalesced with in-flight query");
                    return false;
                }
                Some(flight) => {
                    tracing::debug!(watch = %self.key, "Refresh deferred until previous watch's query ends");
                    flight.successor = Some(Arc::clone(self));
                    return false;
                }
                None => {
                    queries.insert(
                        self.key,
                        Flight {
                            owner: self.generation,
                            successor: None,
                        },
                    );
                }
            }
        }

        let watch = Arc::clone(self);
        let api = Arc::clone(api);
        tokio::spawn(async move {
            watch.query(&api).await;
        });
        true
    }

    async fn query(&self, api: &Arc<dyn FactoryApi>) {
        // Resolved per query, never cached across refreshes
        let range = resolve_now(self.key.selector).to_utc();
        let result = api.get_oee(self.key.machine_id, range.start, range.end).await;
        let successor = self.in_flight.finish(&self.key);

        if self.alive.load(Ordering::SeqCst) {
            self.deliver(result, range);
        } else {
            tracing::debug!(watch = %self.key, "Discarding OEE response for torn-down watch");
        }

        if let Some(next) = successor {
            next.trigger(api);
        }
    }

    fn deliver(&self, result: ApiResult<OeeReport>, range: ResolvedRange<Utc>) {
        let update = match result {
            Ok(report) => {
                let snapshot = OeeSnapshot::from_report(report, range.end, range.start, range.end);
                *self.latest() = Some(snapshot.clone());
                tracing::debug!(watch = %self.key, oee = snapshot.oee, "OEE snapshot refreshed");
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(watch = %self.key, error = %e, "OEE query rejected");
                Err(OrchestratorError::QueryRejected {
                    machine_id: self.key.machine_id,
                    selector: self.key.selector,
                    reason: e.to_string(),
                })
            }
        };

        let consumers: Vec<Arc<Consumer>> = self.consumers().clone();
        for consumer in consumers {
            consumer.notify(&self.key, &update);
        }
    }
}

struct WatchEntry {
    watch: Arc<Watch>,
    timer: JoinHandle<()>,
}

impl WatchEntry {
    fn teardown(self) {
        self.watch.alive.store(false, Ordering::SeqCst);
        for consumer in self.watch.consumers().drain(..) {
            consumer.active.store(false, Ordering::SeqCst);
        }
        self.timer.abort();
        tracing::info!(watch = %self.watch.key, "OEE watch stopped");
    }
}

struct Registry {
    api: Arc<dyn FactoryApi>,
    refresh_interval: Duration,
    watches: Mutex<HashMap<WatchKey, WatchEntry>>,
    in_flight: Arc<InFlight>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<WatchKey, WatchEntry>> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_timer(&self, watch: Arc<Watch>) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let period = self.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // First tick completes immediately
                ticker.tick().await;
                watch.trigger(&api);
            }
        })
    }

    /// Remove one consumer; the last one out tears the watch down
    fn remove_consumer(&self, key: WatchKey, id: Uuid) -> bool {
        let mut watches = self.lock();

        let remaining = match watches.get(&key) {
            Some(entry) => {
                let mut consumers = entry.watch.consumers();
                let Some(pos) = consumers.iter().position(|c| c.id == id) else {
                    return false;
                };
                let consumer = consumers.remove(pos);
                consumer.active.store(false, Ordering::SeqCst);
                consumers.len()
            }
            None => return false,
        };

        if remaining == 0 {
            if let Some(entry) = watches.remove(&key) {
                entry.teardown();
            }
        }
        true
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let watches = self.watches.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in watches.drain() {
            entry.teardown();
        }
    }
}

/// Periodic OEE refresh for watched machines
#[derive(Clone)]
pub struct OeeOrchestrator {
    registry: Arc<Registry>,
}

impl OeeOrchestrator {
    /// Intervals below one second are raised to one second.
    pub fn new(api: Arc<dyn FactoryApi>, refresh_interval: Duration) -> Self {
        Self {
            registry: Arc::new(Registry {
                api,
                refresh_interval: refresh_interval.max(MIN_REFRESH_INTERVAL),
                watches: Mutex::new(HashMap::new()),
                in_flight: Arc::new(InFlight::default()),
            }),
        }
    }

    /// Start receiving OEE updates for a machine over a symbolic range
    ///
    /// The first consumer of a (machine, selector) pair starts its timer,
    /// which queries immediately and then once per refresh interval. Later
    /// consumers share that timer and receive the cached snapshot, if any,
    /// before this returns. Query failures arrive as
    /// [`OrchestratorError::QueryRejected`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_oee<F>(&self, machine_id: MachineId, selector: TimeRangeSelector, on_update: F) -> WatchGuard
    where
        F: Fn(&OeeUpdate) + Send + Sync + 'static,
    {
        let key = WatchKey { machine_id, selector };
        let consumer = Arc::new(Consumer {
            id: Uuid::new_v4(),
            active: AtomicBool::new(true),
            callback: Box::new(on_update),
        });

        let cached = {
            let mut watches = self.registry.lock();
            match watches.get(&key) {
                Some(entry) => {
                    entry.watch.consumers().push(Arc::clone(&consumer));
                    entry.watch.latest().clone()
                }
                None => {
                    let watch = Arc::new(Watch::new(key, Arc::clone(&self.registry.in_flight)));
                    watch.consumers().push(Arc::clone(&consumer));
                    let timer = self.registry.spawn_timer(Arc::clone(&watch));
                    watches.insert(key, WatchEntry { watch, timer });
                    tracing::info!(
                        watch = %key,
                        interval_secs = self.registry.refresh_interval.as_secs(),
                        "OEE watch started"
                    );
                    None
                }
            }
        };

        if let Some(snapshot) = cached {
            consumer.notify(&key, &Ok(snapshot));
        }

        WatchGuard {
            registry: Arc::clone(&self.registry),
            key,
            id: consumer.id,
            active: true,
        }
    }

    /// Ask for an immediate refresh
    ///
    /// Returns `false` if the pair is not watched or a query is already in
    /// flight for it.
    pub fn refresh(&self, machine_id: MachineId, selector: TimeRangeSelector) -> bool {
        let key = WatchKey { machine_id, selector };
        let watch = self.registry.lock().get(&key).map(|e| Arc::clone(&e.watch));
        match watch {
            Some(watch) => watch.trigger(&self.registry.api),
            None => false,
        }
    }

    /// Most recent successful snapshot for a watched pair
    pub fn snapshot(&self, machine_id: MachineId, selector: TimeRangeSelector) -> Option<OeeSnapshot> {
        let key = WatchKey { machine_id, selector };
        self.registry
            .lock()
            .get(&key)
            .and_then(|e| e.watch.latest().clone())
    }

    /// Whether a query for the pair is outstanding, even one issued
    /// before the pair was last unwatched
    pub fn is_refreshing(&self, machine_id: MachineId, selector: TimeRangeSelector) -> bool {
        self.registry.in_flight.contains(&WatchKey { machine_id, selector })
    }

    /// Number of watched pairs
    pub fn watch_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn consumer_count(&self, machine_id: MachineId, selector: TimeRangeSelector) -> usize {
        let key = WatchKey { machine_id, selector };
        self.registry
            .lock()
            .get(&key)
            .map(|e| e.watch.consumers().len())
            .unwrap_or(0)
    }

    pub fn refresh_interval(&self) -> Duration {
        self.registry.refresh_interval
    }

    /// Tear down every watch; outstanding guards become no-ops
    pub fn shutdown(&self) {
        let entries: Vec<WatchEntry> = self.registry.lock().drain().map(|(_, e)| e).collect();
        if !entries.is_empty() {
            tracing::info!(watches = entries.len(), "Stopping OEE watches");
        }
        for entry in entries {
            entry.teardown();
        }
    }
}

/// Keeps a consumer registered; unwatches on drop
pub struct WatchGuard {
    registry: Arc<Registry>,
    key: WatchKey,
    id: Uuid,
    active: bool,
}

impl WatchGuard {
    pub fn key(&self) -> WatchKey {
        self.key
    }

    /// Stop receiving updates
    ///
    /// Returns `false` if the watch was already torn down by
    /// [`OeeOrchestrator::shutdown`].
    pub fn unwatch(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if !std::mem::replace(&mut self.active, false) {
            return false;
        }
        self.registry.remove_consumer(self.key, self.id)
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGuard")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
