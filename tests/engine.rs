//! End-to-end tests of the engine with an in-memory telemetry source and backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use shopfloor::{
    ApiError, ApiResult, BusEvent, Config, ConfigError, ConnectionError, ConnectionResult, ConnectionState, Engine,
    EngineError, EngineOptions, FactoryApi, Frame, Machine, MachineId, MachineStatus, MathError,
    OeeInputs, OeeReport, ProductionRecord, TelemetryRecord, TimeRangeSelector, Transport,
    TransportLink, MACHINE_UPDATE, OEE_UPDATE,
};

/// Telemetry source side of one link
struct Remote {
    to_engine: mpsc::UnboundedSender<Frame>,
    from_engine: mpsc::UnboundedReceiver<Frame>,
}

impl Remote {
    fn push(&self, kind: &str, payload: serde_json::Value) {
        self.to_engine.send(Frame::new(kind, payload)).unwrap();
    }
}

struct ChannelTransport {
    remotes: mpsc::UnboundedSender<Remote>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn open(&self) -> ConnectionResult<TransportLink> {
        let (outbound, from_engine) = mpsc::unbounded_channel();
        let (to_engine, inbound) = mpsc::unbounded_channel();
        self.remotes
            .send(Remote { to_engine, from_engine })
            .map_err(|_| ConnectionError::Transport("test over".to_string()))?;
        Ok(TransportLink { outbound, inbound })
    }

    fn endpoint(&self) -> &str {
        "test://telemetry"
    }
}

/// Backend that answers every query at once
struct StaticApi {
    report: OeeReport,
    production: Mutex<Vec<ProductionRecord>>,
}

#[async_trait]
impl FactoryApi for StaticApi {
    async fn get_oee(&self, _: MachineId, _: DateTime<Utc>, _: DateTime<Utc>) -> ApiResult<OeeReport> {
        Ok(self.report)
    }

    async fn list_machines(&self) -> ApiResult<Vec<Machine>> {
        Ok(vec![
            press(1, MachineStatus::Running),
            Machine {
                id: 2,
                name: "Lathe 2".to_string(),
                machine_type: "lathe".to_string(),
                ideal_cycle_time: 45.0,
                status: MachineStatus::Maintenance,
            },
        ])
    }

    async fn get_machine(&self, machine_id: MachineId) -> ApiResult<Machine> {
        if machine_id == 1 {
            Ok(press(1, MachineStatus::Running))
        } else {
            Err(ApiError::NotFound(format!("machine {}", machine_id)))
        }
    }

    async fn record_production(&self, record: ProductionRecord) -> ApiResult<()> {
        self.production.lock().unwrap().push(record);
        Ok(())
    }

    async fn send_machine_data(&self, _: MachineId, _: &TelemetryRecord) -> ApiResult<()> {
        Ok(())
    }
}

fn press(id: MachineId, status: MachineStatus) -> Machine {
    Machine {
        id,
        name: format!("Press {}", id),
        machine_type: "press".to_string(),
        ideal_cycle_time: 30.0,
        status,
    }
}

fn setup() -> (Engine, Arc<StaticApi>, mpsc::UnboundedReceiver<Remote>) {
    let (remotes, remote_rx) = mpsc::unbounded_channel();
    let api = Arc::new(StaticApi {
        report: OeeReport {
            availability: 0.875,
            performance: 0.9,
            quality: 0.9,
            oee: 0.70875,
        },
        production: Mutex::new(Vec::new()),
    });
    let engine = Engine::new(
        Arc::new(ChannelTransport { remotes }),
        api.clone(),
        EngineOptions::default(),
    );
    (engine, api, remote_rx)
}

/// Bus listener forwarding machine ids of delivered events
fn tap(engine: &Engine, topic: &str) -> mpsc::UnboundedReceiver<MachineId> {
    let (tx, rx) = mpsc::unbounded_channel();
    engine.on_topic(topic, move |event: &BusEvent| {
        if let Some(id) = event.machine_id() {
            let _ = tx.send(id);
        }
    });
    rx
}

#[tokio::test]
async fn test_live_telemetry_fills_bounded_window() {
    let (engine, _api, mut remotes) = setup();
    let mut delivered = tap(&engine, MACHINE_UPDATE);

    assert!(engine.watch_machine(1));
    engine.start().await;

    let mut remote = remotes.recv().await.unwrap();
    let subscribe = remote.from_engine.recv().await.unwrap();
    assert_eq!(subscribe.kind, "subscribe");
    assert_eq!(subscribe.machine_id(), Some(1));

    for n in 0..120u64 {
        remote.push(MACHINE_UPDATE, json!({ "machine_id": 1, "cycle_count": n, "temperature": 60.5 }));
    }
    for _ in 0..120 {
        assert_eq!(delivered.recv().await, Some(1));
    }

    let window = engine.get_window(1);
    assert_eq!(window.len(), 100);
    let cycles: Vec<u64> = window.iter().filter_map(|r| r.cycle_count).collect();
    assert_eq!(cycles, (20..120).collect::<Vec<_>>());
    assert_eq!(engine.latest(1).unwrap().cycle_count, Some(119));
    assert_eq!(engine.connection_state(), ConnectionState::Connected);

    engine.shutdown().await;
    assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unwatched_updates_are_dropped() {
    let (engine, _api, mut remotes) = setup();
    let mut telemetry = tap(&engine, MACHINE_UPDATE);
    let mut oee = tap(&engine, OEE_UPDATE);

    engine.watch_machine(1);
    engine.start().await;
    let mut remote = remotes.recv().await.unwrap();
    remote.from_engine.recv().await.unwrap();

    remote.push(MACHINE_UPDATE, json!({ "machine_id": 9, "status": "running" }));
    remote.push("alarm", json!({ "machine_id": 1 }));
    remote.push(OEE_UPDATE, json!({
        "machine_id": 1, "availability": 0.9, "performance": 0.8, "quality": 1.0, "oee": 0.72
    }));
    remote.push(MACHINE_UPDATE, json!({ "machine_id": 1, "status": "idle" }));

    assert_eq!(oee.recv().await, Some(1));
    assert_eq!(telemetry.recv().await, Some(1));
    assert!(engine.get_window(9).is_empty());
    assert_eq!(engine.get_window(1)[0].status, Some(MachineStatus::Idle));

    // Last watcher out unsubscribes and frees the window
    assert!(engine.unwatch_machine(1));
    let unsubscribe = remote.from_engine.recv().await.unwrap();
    assert_eq!(unsubscribe.kind, "unsubscribe");
    assert!(engine.get_window(1).is_empty());

    // An update that got past routing before the unwatch is not kept either
    engine.bus().publish(&BusEvent::MachineUpdate(TelemetryRecord::new(1).cycle_count(7)));
    assert!(engine.get_window(1).is_empty());
    assert!(engine.windows().machines().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_watchers_share_one_subscription() {
    let (engine, _api, mut remotes) = setup();
    engine.start().await;
    let mut remote = remotes.recv().await.unwrap();
    engine.connection().wait_for_state(ConnectionState::Connected).await.unwrap();

    assert!(engine.watch_machine(5));
    assert!(!engine.watch_machine(5));
    assert!(!engine.unwatch_machine(5));
    assert!(engine.unwatch_machine(5));

    let frames: Vec<String> = [
        remote.from_engine.recv().await.unwrap(),
        remote.from_engine.recv().await.unwrap(),
    ]
    .into_iter()
    .map(|f| f.kind)
    .collect();
    assert_eq!(frames, vec!["subscribe", "unsubscribe"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_send_before_start_fails_fast() {
    let (engine, _api, _remotes) = setup();
    let result = engine.send("ping", json!({}));
    assert!(matches!(result, Err(EngineError::Connection(ConnectionError::NotConnected))));
}

#[tokio::test]
async fn test_watch_oee_delivers_snapshot() {
    let (engine, _api, _remotes) = setup();
    let (tx, mut updates) = mpsc::unbounded_channel();

    let guard = engine.watch_oee(1, TimeRangeSelector::Week, move |update| {
        let _ = tx.send(update.clone());
    });

    let snapshot = updates.recv().await.unwrap().unwrap();
    assert_eq!(snapshot.oee, 0.70875);
    assert_eq!(snapshot.range_end - snapshot.range_start, chrono::Duration::days(7));
    assert_eq!(engine.orchestrator().watch_count(), 1);

    guard.unwatch();
    assert_eq!(engine.orchestrator().watch_count(), 0);
}

#[tokio::test]
async fn test_backend_calls() {
    let (engine, api, _remotes) = setup();

    let machine = engine.machine(1).await.unwrap();
    assert_eq!(machine.name, "Press 1");
    let listed: Vec<MachineId> = engine.machines().await.unwrap().iter().map(|m| m.id).collect();
    assert_eq!(listed, vec![1, 2]);
    assert!(matches!(
        engine.machine(2).await,
        Err(EngineError::Api(ApiError::NotFound(_)))
    ));

    let mut session = engine.operator_session(1);
    session.record_good().await.unwrap();
    let tally = session.record_defective().await.unwrap();
    assert_eq!(tally.total(), 2);
    assert_eq!(api.production.lock().unwrap().len(), 2);
}

#[test]
fn test_window_capacity_above_100_rejected() {
    let mut config = Config::default();
    config.window.capacity = 250;
    assert!(matches!(
        EngineOptions::from_config(&config),
        Err(EngineError::Config(ConfigError::Invalid { .. }))
    ));

    config.window.capacity = 50;
    assert_eq!(EngineOptions::from_config(&config).unwrap().window_capacity, 50);
}

#[test]
fn test_local_recomputation() {
    let (engine, _api, _remotes) = setup();

    let breakdown = engine
        .recompute_oee(&OeeInputs {
            planned_production_time: 480.0,
            downtime: 60.0,
            ideal_cycle_time: 1.0,
            total_parts: 400,
            good_parts: 360,
        })
        .unwrap();
    assert_eq!(breakdown.availability, 0.875);
    assert_eq!(breakdown.quality, 0.9);
    assert!((breakdown.oee - 0.875 * (400.0 / 420.0) * 0.9).abs() < 1e-12);

    let undefined = engine.recompute_oee(&OeeInputs {
        planned_production_time: 0.0,
        downtime: 0.0,
        ideal_cycle_time: 1.0,
        total_parts: 0,
        good_parts: 0,
    });
    assert!(matches!(
        undefined,
        Err(EngineError::Math(MathError::DivisionByZero { .. }))
    ));
}

#[test]
fn test_resolve_range_and_shifts() {
    let (engine, _api, _remotes) = setup();

    let range = engine.resolve_range(TimeRangeSelector::Shift);
    assert_eq!(range.duration(), chrono::Duration::hours(8));
    assert_eq!(engine.shifts().shifts().len(), 3);
    // Three back-to-back shifts cover the whole day
    assert!(engine.current_shift().is_some());
}
