//! PhasorGrid Recovery
//!
//! Analysis and failover on top of [`phasorgrid_topology::Topology`].
//!
//! # Critical Sources
//!
//! [`critical_sources`] marks every source that is the only observer of some
//! bus. [`CriticalNodeAnalyzer`] caches the answer until the source set
//! changes.
//!
//! # Failover
//!
//! [`RecoveryRouter`] removes a failed collector and re-homes each orphaned
//! source, trying in order:
//!
//! 1. collectors behind the source's own fabric,
//! 2. collectors behind a mesh neighbor of that fabric,
//! 3. any collector.
//!
//! The first collector with spare capacity wins. Sources that fit nowhere
//! are reported as failed and keep their old home until capacity frees up.

mod change;
mod critical;
mod router;
mod strategy;

pub use change::{CycleOutcome, Disposition, FaultEvent, RecoveryCause, RouteChange, RouteStatus};
pub use critical::{bus_observers, critical_sources, CriticalNodeAnalyzer, CriticalReport};
pub use router::{source_state, RecoveryRouter, SourceState};
pub use strategy::{find_collector, SearchTier};
