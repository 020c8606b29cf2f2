//! PhasorGrid Controller
//!
//! Runs the recovery router as a single-writer actor over a shared topology.
//!
//! # Architecture
//!
//! ```text
//! FaultReporter ──┐
//! FaultReporter ──┼─ mpsc ─▶ Controller ──write lock──▶ Topology
//! FaultReporter ──┘              │
//!                                └─ after unlock ─▶ RouteSinks
//!
//! ControllerHandle ──read lock──▶ critical sources, snapshots
//! ```
//!
//! Each fault is handled start to finish under the write lock, so two faults
//! can never both claim the last free slot of a collector.

mod config;
mod controller;
mod error;
mod sink;

pub use config::{ConfigError, ControllerConfig};
pub use controller::{ControlEvent, Controller, ControllerHandle, FaultReporter, SharedTopology};
pub use error::{Error, Result};
pub use sink::{ChannelSink, JsonLinesSink, RouteLogSink, RouteSink, TracingSink};
