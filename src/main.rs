//! Shopfloor CLI
//!
//! Connects to the telemetry source, watches the given machines (or every
//! machine the backend lists) and logs their live telemetry and OEE until
//! interrupted.
//!
//! # Configuration
//!
//! Read from `--config`, or the first of
//! `~/.config/shopfloor/config.toml`, `/etc/shopfloor/config.toml` and
//! `./config.toml`; `SHOPFLOOR_*` environment variables override it.
//! `RUST_LOG` overrides the configured log level.

use clap::Parser;
use shopfloor::telemetry::format;
use shopfloor::{
    generate_default_config, BusEvent, Config, Engine, LoggingConfig, MachineId, TimeRangeSelector,
    WatchGuard, MACHINE_UPDATE, OEE_UPDATE,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "shopfloor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time shop-floor telemetry and OEE monitor")]
struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Machine to watch (repeatable); defaults to every listed machine
    #[arg(short, long = "machine")]
    machines: Vec<MachineId>,

    /// OEE time range: today, shift or week
    #[arg(short, long, default_value = "today")]
    range: TimeRangeSelector,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);

    tracing::info!("Shopfloor v{}", env!("CARGO_PKG_VERSION"));

    let engine = Engine::from_config(&config)?;

    let telemetry = engine.on_topic(MACHINE_UPDATE, |event| {
        if let BusEvent::MachineUpdate(record) = event {
            tracing::info!(
                machine_id = record.machine_id,
                status = ?record.status,
                temperature = ?record.temperature,
                pressure = ?record.pressure,
                cycle_count = ?record.cycle_count,
                "Telemetry"
            );
        }
    });
    let pushes = engine.on_topic(OEE_UPDATE, |event| {
        if let BusEvent::OeeUpdate(push) = event {
            tracing::info!(machine_id = push.machine_id, oee = push.report.oee, "OEE pushed");
        }
    });

    engine.start().await;
    let started = Instant::now();

    let machines: Vec<MachineId> = if cli.machines.is_empty() {
        match engine.machines().await {
            Ok(listed) => {
                tracing::info!(count = listed.len(), "Watching every listed machine");
                listed.into_iter().map(|m| m.id).collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Machine list unavailable");
                Vec::new()
            }
        }
    } else {
        cli.machines.clone()
    };

    let mut guards: Vec<WatchGuard> = Vec::with_capacity(machines.len());
    for &machine_id in &machines {
        match engine.machine(machine_id).await {
            Ok(machine) => tracing::info!(
                machine_id,
                name = %machine.name,
                machine_type = %machine.machine_type,
                status = %machine.status,
                "Watching machine"
            ),
            Err(e) => tracing::warn!(machine_id, error = %e, "Machine lookup failed, watching anyway"),
        }

        engine.watch_machine(machine_id);
        guards.push(engine.watch_oee(machine_id, cli.range, move |update| match update {
            Ok(snapshot) => tracing::info!(
                machine_id,
                availability = %format::percentage(snapshot.availability, 1),
                performance = %format::percentage(snapshot.performance, 1),
                quality = %format::percentage(snapshot.quality, 1),
                oee = %format::percentage(snapshot.oee, 1),
                status = %snapshot.status(),
                "OEE refreshed"
            ),
            Err(e) => tracing::warn!(machine_id, error = %e, "OEE unavailable"),
        }));
    }

    if machines.is_empty() {
        tracing::warn!("No machines to watch, only connection state will be logged");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!(uptime = %format::duration(started.elapsed().as_secs()), "Shutting down...");

    drop(guards);
    for &machine_id in &machines {
        engine.unwatch_machine(machine_id);
    }
    engine.off_topic(&telemetry);
    engine.off_topic(&pushes);
    engine.shutdown().await;

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shopfloor={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
