//! Fault events and route-change records.

use std::fmt;
use std::net::Ipv4Addr;

use phasorgrid_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::SearchTier;

/// Notification that a collector went away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub removed_collector_id: NodeId,
}

impl FaultEvent {
    pub fn new(collector: impl Into<NodeId>) -> Self {
        Self {
            removed_collector_id: collector.into(),
        }
    }
}

/// Outcome of one reroute attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Success,
    /// No collector could take the source. It stays disconnected.
    Failed,
}

/// One source's reroute, successful or not.
///
/// Addresses are captured at commit time so the record can be logged after
/// the store lock is released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteChange {
    pub source_id: NodeId,
    pub old_collector_id: Option<NodeId>,
    pub new_collector_id: Option<NodeId>,
    pub status: RouteStatus,
    /// Tier the new collector was found in.
    pub tier: Option<SearchTier>,
    pub source_address: Ipv4Addr,
    pub old_collector_address: Option<Ipv4Addr>,
    pub new_collector_address: Option<Ipv4Addr>,
}

impl RouteChange {
    pub fn is_success(&self) -> bool {
        self.status == RouteStatus::Success
    }
}

/// What triggered a recovery cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "collector", rename_all = "snake_case")]
pub enum RecoveryCause {
    Fault(NodeId),
    Restore(NodeId),
    Sweep,
}

impl fmt::Display for RecoveryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault(id) => write!(f, "fault on {id}"),
            Self::Restore(id) => write!(f, "restore of {id}"),
            Self::Sweep => write!(f, "sweep"),
        }
    }
}

/// How the router treated the triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    /// The collector was removed from the store.
    Removed { address: Ipv4Addr },
    /// The collector had already been retired by an earlier fault.
    Duplicate,
    /// No such collector was ever known.
    Unknown,
    /// The collector was re-inserted.
    Restored,
    /// Plain sweep, no topology event.
    Swept,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub cause: RecoveryCause,
    pub disposition: Disposition,
    pub changes: Vec<RouteChange>,
}

impl CycleOutcome {
    pub(crate) fn quiet(cause: RecoveryCause, disposition: Disposition) -> Self {
        Self {
            cause,
            disposition,
            changes: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RouteChange> {
        self.changes.iter().filter(|c| c.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RouteChange> {
        self.changes.iter().filter(|c| !c.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_event_wire_format() {
        let event: FaultEvent = serde_json::from_str(r#"{"removed_collector_id": "PDC2"}"#).unwrap();
        assert_eq!(event, FaultEvent::new("PDC2"));
    }

    #[test]
    fn route_change_serializes_flat() {
        let change = RouteChange {
            source_id: NodeId::new("PMU1"),
            old_collector_id: Some(NodeId::new("PDC1")),
            new_collector_id: Some(NodeId::new("PDC2")),
            status: RouteStatus::Success,
            tier: Some(SearchTier::SameFabric),
            source_address: Ipv4Addr::new(10, 0, 1, 1),
            old_collector_address: Some(Ipv4Addr::new(10, 0, 2, 1)),
            new_collector_address: Some(Ipv4Addr::new(10, 0, 2, 2)),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["tier"], "same_fabric");
        assert_eq!(value["new_collector_address"], "10.0.2.2");
    }

    #[test]
    fn cause_display() {
        assert_eq!(RecoveryCause::Fault(NodeId::new("PDC1")).to_string(), "fault on PDC1");
        assert_eq!(RecoveryCause::Sweep.to_string(), "sweep");
    }
}
