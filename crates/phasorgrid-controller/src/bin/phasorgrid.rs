//! phasorgrid controller binary
//!
//! Loads a topology and handles collector faults read from stdin.
//!
//! Usage:
//!   phasorgrid [topology.json]
//!
//! Each stdin line is one of:
//!   {"removed_collector_id": "PDC2"}         a collector fault
//!   {"event": "collector_restored", ...}     any control event
//!   sweep                                    retry disconnected sources
//!   snapshot                                 print the topology as JSON
//!   critical                                 print the critical sources
//!
//! Route changes are written to stdout as JSON lines.

use phasorgrid_controller::{
    ControlEvent, Controller, ControllerConfig, JsonLinesSink, RouteLogSink, TracingSink,
};
use phasorgrid_recovery::FaultEvent;
use phasorgrid_topology::Topology;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_usage() {
    eprintln!("phasorgrid - self-healing measurement network controller");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  phasorgrid [topology.json]");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PHASORGRID_TOPOLOGY       Topology description (default: topology.json)");
    eprintln!("  PHASORGRID_ROUTE_LOG      Append route changes to this file");
    eprintln!("  PHASORGRID_SOURCE_NET     Source address range (default: 10.0.1.0/24)");
    eprintln!("  PHASORGRID_COLLECTOR_NET  Collector address range (default: 10.0.2.0/24)");
    eprintln!("  PHASORGRID_QUEUE_DEPTH    Fault queue depth (default: 64)");
    eprintln!("  RUST_LOG                  Log filter (default: phasorgrid=info)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phasorgrid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ControllerConfig::from_env()?;
    if let Some(arg) = std::env::args().nth(1) {
        if arg == "-h" || arg == "--help" {
            print_usage();
            return Ok(());
        }
        config.topology_path = arg.into();
    }

    tracing::info!("Starting phasorgrid controller");
    let topology = Topology::from_path(&config.topology_path, &config.role_rules)?;

    let (mut controller, handle) = Controller::new(topology, config.queue_depth);
    controller.add_sink(TracingSink);
    controller.add_sink(JsonLinesSink::new(std::io::stdout()));
    if let Some(path) = &config.route_log {
        controller.add_sink(RouteLogSink::append(path)?);
        tracing::info!("Logging route changes to {}", path.display());
    }
    let task = tokio::spawn(controller.run());

    let reporter = handle.reporter();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "snapshot" => println!("{}", serde_json::to_string(&handle.snapshot().await)?),
            "critical" => println!("{}", serde_json::to_string(&handle.critical_sources().await)?),
            "sweep" => {
                reporter.submit(ControlEvent::Sweep).await?;
            }
            _ => {
                if let Ok(fault) = serde_json::from_str::<FaultEvent>(line) {
                    reporter.report(fault.removed_collector_id).await?;
                } else {
                    match serde_json::from_str::<ControlEvent>(line) {
                        Ok(event) => {
                            if let Err(e) = reporter.submit(event).await {
                                tracing::warn!("{}", e);
                            }
                        }
                        Err(e) => tracing::warn!("Ignoring input line: {}", e),
                    }
                }
            }
        }
    }

    drop(reporter);
    drop(handle);
    task.await?;
    Ok(())
}
