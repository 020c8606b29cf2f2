//! Critical-source analysis.
//!
//! A bus is observable while at least one source measures it, directly or
//! through an adjacent line measurement. A source is critical when it is the
//! only observer of at least one bus: losing it makes that bus unobservable.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use phasorgrid_topology::{BusId, NodeId, StoreId, Topology};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Critical sources and the buses only they observe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalReport {
    pub critical_source_ids: BTreeSet<NodeId>,
    /// For each critical source, the buses it observes alone.
    pub sole_observed: BTreeMap<NodeId, BTreeSet<BusId>>,
}

impl CriticalReport {
    pub fn is_critical(&self, source: &str) -> bool {
        self.critical_source_ids.contains(source)
    }

    pub fn len(&self) -> usize {
        self.critical_source_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.critical_source_ids.is_empty()
    }
}

/// Map every observed bus to the sources observing it.
pub fn bus_observers(topo: &Topology) -> BTreeMap<&BusId, BTreeSet<&NodeId>> {
    let mut observers: BTreeMap<&BusId, BTreeSet<&NodeId>> = BTreeMap::new();
    for source in topo.sources() {
        for bus in source.observed_buses() {
            observers.entry(bus).or_default().insert(&source.id);
        }
    }
    observers
}

/// Compute the critical sources of `topo`.
pub fn critical_sources(topo: &Topology) -> CriticalReport {
    let started = Instant::now();
    let observers = bus_observers(topo);

    let mut report = CriticalReport::default();
    for (bus, sources) in &observers {
        let mut it = sources.iter();
        if let (Some(&only), None) = (it.next(), it.next()) {
            report.critical_source_ids.insert(only.clone());
            report
                .sole_observed
                .entry(only.clone())
                .or_default()
                .insert((*bus).clone());
        }
    }

    debug!(
        "Critical analysis: {} buses, {} critical sources in {:?}",
        observers.len(),
        report.len(),
        started.elapsed()
    );
    report
}

/// Caches the last report per store and source set.
///
/// Rerouting never changes which buses a source observes, so the report only
/// goes stale when a source is added or the store is replaced.
#[derive(Debug, Default)]
pub struct CriticalNodeAnalyzer {
    cached: Option<((StoreId, u64), CriticalReport)>,
}

impl CriticalNodeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The report for `topo`, recomputed only if the source set changed.
    pub fn analyze(&mut self, topo: &Topology) -> &CriticalReport {
        let key = (topo.store_id(), topo.source_epoch());
        let fresh = matches!(&self.cached, Some((k, _)) if *k == key);
        if !fresh {
            self.cached = None;
        }
        let (_, report) = self
            .cached
            .get_or_insert_with(|| (key, critical_sources(topo)));
        report
    }

    /// Drop the cached report.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
