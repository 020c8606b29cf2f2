//! Route-change sinks.
//!
//! Sinks receive each cycle's outcome after the topology lock is released.
//! A failing sink is logged and skipped; it never affects the topology.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::Path;

use phasorgrid_recovery::{CycleOutcome, Disposition, RouteStatus};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::Result;

/// Receives the outcome of every recovery cycle.
pub trait RouteSink: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()>;
}

/// Logs each change through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl RouteSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()> {
        if outcome.disposition == Disposition::Duplicate {
            info!("Duplicate {} absorbed", outcome.cause);
        }
        for change in &outcome.changes {
            match change.status {
                RouteStatus::Success => info!(
                    "Route change: {} {} -> {} ({})",
                    change.source_id,
                    or_none(change.old_collector_id.as_ref()),
                    or_none(change.new_collector_id.as_ref()),
                    or_none(change.tier.as_ref())
                ),
                RouteStatus::Failed => warn!(
                    "Reroute failed: {} stays on {}",
                    change.source_id,
                    or_none(change.old_collector_id.as_ref())
                ),
            }
        }
        Ok(())
    }
}

/// Writes each change as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RouteSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()> {
        for change in &outcome.changes {
            serde_json::to_writer(&mut self.out, change)?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Appends `source_addr, removed_addr, new_addr` lines for successful reroutes.
#[derive(Debug)]
pub struct RouteLogSink<W> {
    out: W,
}

impl RouteLogSink<File> {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> RouteLogSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RouteSink for RouteLogSink<W> {
    fn name(&self) -> &str {
        "route-log"
    }

    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()> {
        for change in outcome.succeeded() {
            writeln!(
                self.out,
                "{}, {}, {}",
                change.source_address,
                addr(change.old_collector_address),
                addr(change.new_collector_address)
            )?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Broadcasts outcomes to in-process subscribers.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<CycleOutcome>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleOutcome> {
        self.tx.subscribe()
    }
}

impl RouteSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn publish(&mut self, outcome: &CycleOutcome) -> Result<()> {
        // no subscribers is not an error
        let _ = self.tx.send(outcome.clone());
        Ok(())
    }
}

fn or_none<T: std::fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "none".to_string(), ToString::to_string)
}

fn addr(value: Option<Ipv4Addr>) -> String {
    value.map_or_else(|| "-".to_string(), |a| a.to_string())
}
