//! Telemetry Windows
//!
//! Per-machine bounded history of the most recent telemetry records.
//!
//! - Capacity is fixed per store and never above 100; appending to a full window
//!   evicts exactly one oldest record first, under the same lock, so a reader
//!   never observes more than `capacity` records.
//! - Order is arrival order, not timestamp order.
//! - Windows are allocated lazily on the first record for a machine.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bus::{BusEvent, EventBus, SubscriptionHandle, Topic};
use crate::telemetry::{MachineId, TelemetryRecord};

/// Records kept per machine, and the most any store will keep
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded per-machine telemetry history
pub struct TelemetryWindows {
    windows: RwLock<HashMap<MachineId, VecDeque<TelemetryRecord>>>,
    capacity: usize,
}

impl TelemetryWindows {
    /// Create a store; capacity is clamped to `1..=DEFAULT_CAPACITY`
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            capacity: capacity.clamp(1, DEFAULT_CAPACITY),
        }
    }

    /// Feed this store from `machine_update` events on the bus
    ///
    /// Records are kept only for machines `accept` approves at append time.
    pub fn attach<F>(self: &Arc<Self>, bus: &EventBus, accept: F) -> SubscriptionHandle
    where
        F: Fn(MachineId) -> bool + Send + Sync + 'static,
    {
        let windows = Arc::clone(self);
        bus.subscribe(Topic::MachineUpdate, move |event| {
            if let BusEvent::MachineUpdate(record) = event {
                windows.append_if(record.clone(), &accept);
            }
        })
    }

    /// Append a record to its machine's window
    ///
    /// Returns the window length after the append.
    pub fn append(&self, record: TelemetryRecord) -> usize {
        let mut windows = self.write();
        self.push(&mut windows, record)
    }

    /// Append only if `accept` approves the machine
    ///
    /// `accept` runs under the write lock, so a [`discard`](Self::discard)
    /// issued after it stops approving cannot be undone by a racing append.
    pub fn append_if<F>(&self, record: TelemetryRecord, accept: F) -> Option<usize>
    where
        F: Fn(MachineId) -> bool,
    {
        let mut windows = self.write();
        if !accept(record.machine_id) {
            tracing::debug!(machine_id = record.machine_id, "Record for unwatched machine not kept");
            return None;
        }
        Some(self.push(&mut windows, record))
    }

    fn push(&self, windows: &mut HashMap<MachineId, VecDeque<TelemetryRecord>>, record: TelemetryRecord) -> usize {
        let window = windows
            .entry(record.machine_id)
            .or_insert_with(|| {
                tracing::debug!(machine_id = record.machine_id, "Telemetry window allocated");
                VecDeque::with_capacity(self.capacity)
            });

        if window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(record);
        window.len()
    }

    /// Records for a machine, oldest first; empty if none were seen
    pub fn get(&self, machine_id: MachineId) -> Vec<TelemetryRecord> {
        self.read()
            .get(&machine_id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recently arrived record
    pub fn latest(&self, machine_id: MachineId) -> Option<TelemetryRecord> {
        self.read().get(&machine_id).and_then(|w| w.back().cloned())
    }

    /// Values of one field across the window, skipping records without it
    ///
    /// ```rust
    /// use shopfloor::window::TelemetryWindows;
    /// use shopfloor::telemetry::TelemetryRecord;
    ///
    /// let windows = TelemetryWindows::new(10);
    /// windows.append(TelemetryRecord::new(1).temperature(60.0));
    /// windows.append(TelemetryRecord::new(1).pressure(3.0));
    /// windows.append(TelemetryRecord::new(1).temperature(66.0));
    ///
    /// assert_eq!(windows.series(1, |r| r.temperature), vec![60.0, 66.0]);
    /// ```
    pub fn series<F>(&self, machine_id: MachineId, field: F) -> Vec<f64>
    where
        F: Fn(&TelemetryRecord) -> Option<f64>,
    {
        self.read()
            .get(&machine_id)
            .map(|w| w.iter().filter_map(&field).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, machine_id: MachineId) -> usize {
        self.read().get(&machine_id).map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, machine_id: MachineId) -> bool {
        self.len(machine_id) == 0
    }

    /// Drop a machine's window
    pub fn discard(&self, machine_id: MachineId) -> bool {
        let removed = self.write().remove(&machine_id).is_some();
        if removed {
            tracing::debug!(machine_id, "Telemetry window discarded");
        }
        removed
    }

    /// Machines that currently have a window, sorted
    pub fn machines(&self) -> Vec<MachineId> {
        let mut ids: Vec<MachineId> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MachineId, VecDeque<TelemetryRecord>>> {
        self.windows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MachineId, VecDeque<TelemetryRecord>>> {
        self.windows.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TelemetryWindows {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
