//! Capacity-aware collector failover.
//!
//! After a collector disappears, every source that no longer reaches its home
//! is re-homed to the first collector that can take it, searching the tiers
//! in [`crate::SearchTier::ORDER`]. The search, capacity check and commit for
//! one source happen against a single `&mut Topology`, so no other writer can
//! claim the capacity in between.


use std::collections::HashMap;
use std::net::Ipv4Addr;

use phasorgrid_topology::{BindError, Collector, InsertError, NodeId, Source, StoreId, Topology};
use tracing::{debug, error, info, warn};

use crate::change::{CycleOutcome, Disposition, FaultEvent, RecoveryCause, RouteChange, RouteStatus};
use crate::strategy::find_collector;

/// Where a source stands at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Home exists and is reachable.
    Connected,
    /// Home is gone, or the source was never bound.
    TargetMissing,
    /// Home exists but no path leads to it.
    TargetUnreachable,
}

/// Classify `source` against the current graph.
pub fn source_state(topo: &Topology, source: &Source) -> SourceState {
    match &source.home_collector {
        None => SourceState::TargetMissing,
        Some(home) if topo.collector(home.as_str()).is_none() => SourceState::TargetMissing,
        Some(_) if topo.is_connected(source.id.as_str()) => SourceState::Connected,
        Some(_) => SourceState::TargetUnreachable,
    }
}

/// Re-homes orphaned sources and tracks which collectors it has retired.
#[derive(Debug, Default)]
pub struct RecoveryRouter {
    /// Collectors removed by a fault, with their last address.
    retired: HashMap<NodeId, Ipv4Addr>,
    /// Store state after the last completed sweep.
    settled: Option<(StoreId, u64)>,
}

impl RecoveryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `collector` was removed by a fault and not restored since.
    pub fn is_retired(&self, collector: &str) -> bool {
        self.retired.contains_key(collector)
    }

    /// Remove the failed collector and re-home its sources.
    ///
    /// Repeated or unknown faults are absorbed and produce no changes.
    pub fn handle_fault(&mut self, topo: &mut Topology, event: &FaultEvent) -> CycleOutcome {
        let id = &event.removed_collector_id;
        let cause = RecoveryCause::Fault(id.clone());

        if self.is_retired(id.as_str()) && topo.collector(id.as_str()).is_none() {
            debug!("Ignoring repeated fault for {}", id);
            return CycleOutcome::quiet(cause, Disposition::Duplicate);
        }

        match topo.remove_collector(id.as_str()) {
            Ok(address) => {
                self.retired.insert(id.clone(), address);
                let changes = self.recover(topo, &cause);
                CycleOutcome {
                    cause,
                    disposition: Disposition::Removed { address },
                    changes,
                }
            }
            Err(err) => {
                warn!("Ignoring fault: {}", err);
                CycleOutcome::quiet(cause, Disposition::Unknown)
            }
        }
    }

    /// Put a collector back and give previously failed sources another try.
    pub fn handle_restore(
        &mut self,
        topo: &mut Topology,
        collector: Collector,
        uplinks: &[(&str, f64)],
    ) -> Result<CycleOutcome, InsertError> {
        let id = collector.id.clone();
        let address = collector.address;
        let released = topo.restore_collector(collector, uplinks)?;
        self.retired.remove(&id);
        let cause = RecoveryCause::Restore(id.clone());
        let mut changes = self.recover(topo, &cause);
        for change in changes.iter_mut().filter(|c| released.contains(&c.source_id)) {
            change.old_collector_id = Some(id.clone());
            change.old_collector_address = Some(address);
        }
        Ok(CycleOutcome {
            cause,
            disposition: Disposition::Restored,
            changes,
        })
    }

    /// Run one sweep without a triggering event.
    pub fn sweep(&mut self, topo: &mut Topology) -> CycleOutcome {
        let cause = RecoveryCause::Sweep;
        let changes = self.recover(topo, &cause);
        CycleOutcome {
            cause,
            disposition: Disposition::Swept,
            changes,
        }
    }

    /// Re-home every source that is not connected.
    ///
    /// Returns one record per attempt. If the store has not changed since the
    /// last sweep, nothing is attempted.
    pub fn recover(&mut self, topo: &mut Topology, cause: &RecoveryCause) -> Vec<RouteChange> {
        if self.settled == Some((topo.store_id(), topo.generation())) {
            debug!("Topology unchanged since last sweep, skipping {}", cause);
            return Vec::new();
        }

        let view: &Topology = topo;
        let orphaned: Vec<(NodeId, SourceState)> = view
            .sources()
            .map(|s| (s.id.clone(), source_state(view, s)))
            .filter(|(_, state)| *state != SourceState::Connected)
            .collect();

        let mut changes = Vec::with_capacity(orphaned.len());
        for (id, state) in orphaned {
            if topo.is_connected(id.as_str()) {
                // picked up by an uplink committed for an earlier source
                debug!("{} reconnected during {}", id, cause);
                continue;
            }
            if let Some(change) = self.reroute(topo, &id, state) {
                changes.push(change);
            }
        }

        let succeeded = changes.iter().filter(|c| c.is_success()).count();
        if !changes.is_empty() {
            info!(
                "Recovery after {}: {} rerouted, {} failed",
                cause,
                succeeded,
                changes.len() - succeeded
            );
        }
        self.settled = Some((topo.store_id(), topo.generation()));
        changes
    }

    fn reroute(&self, topo: &mut Topology, id: &NodeId, state: SourceState) -> Option<RouteChange> {
        let source = topo.source(id.as_str())?;
        let old = source.home_collector.clone();
        let old_address = old.as_ref().and_then(|home| {
            topo.collector(home.as_str())
                .map(|c| c.address)
                .or_else(|| self.retired.get(home).copied())
        });
        let mut change = RouteChange {
            source_id: id.clone(),
            old_collector_id: old,
            new_collector_id: None,
            status: RouteStatus::Failed,
            tier: None,
            source_address: source.address,
            old_collector_address: old_address,
            new_collector_address: None,
        };

        let Some((fabric, weight)) = topo.attachment(id.as_str()).map(|(f, w)| (f.clone(), w)) else {
            warn!("{} is not attached to any fabric, cannot reroute", id);
            return Some(change);
        };

        let found = find_collector(topo, id.as_str(), &fabric).map(|(tier, c)| (tier, c.id.clone(), c.address));
        let Some((tier, target, address)) = found else {
            warn!("No collector can take {} ({:?})", id, state);
            return Some(change);
        };
        change.tier = Some(tier);

        match topo.bind(id.as_str(), target.as_str(), fabric.as_str(), weight) {
            Ok(()) => {
                info!("Rerouted {} to {} via {} ({})", id, target, fabric, tier);
                change.status = RouteStatus::Success;
                change.new_collector_id = Some(target);
                change.new_collector_address = Some(address);
            }
            Err(err @ BindError::CapacityViolation { .. }) => {
                error!("Aborting reroute of {}: {}", id, err);
            }
            Err(err) => {
                error!("Cannot commit route for {}: {}", id, err);
            }
        }
        Some(change)
    }
}
