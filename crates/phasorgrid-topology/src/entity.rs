//! Entities stored in the topology graph.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::{BusId, NodeId};

/// A measurement source (PMU).
///
/// A source reports to exactly one collector at a time. Its home binding only
/// changes when the recovery router commits a new route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: NodeId,
    pub address: Ipv4Addr,
    /// Collector this source is bound to, if any.
    pub home_collector: Option<NodeId>,
    /// Buses measured directly.
    pub direct_buses: BTreeSet<BusId>,
    /// Buses made observable through line measurements.
    pub adjacent_buses: BTreeSet<BusId>,
}

impl Source {
    /// Create an unbound source that observes nothing.
    pub fn new(id: impl Into<NodeId>, address: Ipv4Addr) -> Self {
        Self {
            id: id.into(),
            address,
            home_collector: None,
            direct_buses: BTreeSet::new(),
            adjacent_buses: BTreeSet::new(),
        }
    }

    /// Set the home collector.
    #[must_use]
    pub fn with_home(mut self, collector: impl Into<NodeId>) -> Self {
        self.home_collector = Some(collector.into());
        self
    }

    /// Add directly observed buses.
    #[must_use]
    pub fn with_direct_buses<I, B>(mut self, buses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BusId>,
    {
        self.direct_buses.extend(buses.into_iter().map(Into::into));
        self
    }

    /// Add adjacently observed buses.
    #[must_use]
    pub fn with_adjacent_buses<I, B>(mut self, buses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BusId>,
    {
        self.adjacent_buses.extend(buses.into_iter().map(Into::into));
        self
    }

    /// Every bus this source observes, direct or adjacent, without repeats.
    pub fn observed_buses(&self) -> impl Iterator<Item = &BusId> {
        self.direct_buses.union(&self.adjacent_buses)
    }

    /// Whether the source is bound to `collector`.
    pub fn is_homed_to(&self, collector: &str) -> bool {
        self.home_collector.as_ref().is_some_and(|home| home.as_str() == collector)
    }
}

/// A capacity-bounded collector (PDC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collector {
    pub id: NodeId,
    pub address: Ipv4Addr,
    /// Maximum number of bound sources.
    pub capacity: u32,
    /// Number of sources currently bound and connected. Never exceeds `capacity`.
    #[serde(default)]
    pub current_load: u32,
}

impl Collector {
    /// Create an empty collector.
    pub fn new(id: impl Into<NodeId>, address: Ipv4Addr, capacity: u32) -> Self {
        Self {
            id: id.into(),
            address,
            capacity,
            current_load: 0,
        }
    }

    /// Whether one more source fits.
    pub fn has_spare(&self) -> bool {
        self.current_load < self.capacity
    }

    /// Remaining capacity.
    pub fn spare(&self) -> u32 {
        self.capacity.saturating_sub(self.current_load)
    }
}

/// A forwarding element (switch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fabric {
    pub id: NodeId,
    pub address: Option<Ipv4Addr>,
    pub ingress_capacity: u32,
    pub egress_capacity: u32,
    /// Mesh neighbors, in link order.
    pub neighbors: Vec<NodeId>,
}

impl Fabric {
    /// Default ingress/egress capacity for switches that do not declare one.
    pub const DEFAULT_CAPACITY: u32 = 10;

    /// Create a switch with default capacities and no neighbors.
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            address: None,
            ingress_capacity: Self::DEFAULT_CAPACITY,
            egress_capacity: Self::DEFAULT_CAPACITY,
            neighbors: Vec::new(),
        }
    }

    pub(crate) fn add_neighbor(&mut self, neighbor: &NodeId) {
        if !self.neighbors.contains(neighbor) {
            self.neighbors.push(neighbor.clone());
        }
    }

    pub(crate) fn remove_neighbor(&mut self, neighbor: &NodeId) {
        self.neighbors.retain(|n| n != neighbor);
    }
}

/// A generic endpoint that is neither a source nor a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: NodeId,
    pub address: Ipv4Addr,
    pub mac: Option<String>,
}

/// The kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Collector,
    Fabric,
    Host,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Collector => write!(f, "collector"),
            Self::Fabric => write!(f, "fabric"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// A node in the topology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Source(Source),
    Collector(Collector),
    Fabric(Fabric),
    Host(Host),
}

impl Node {
    /// The node's id.
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Source(s) => &s.id,
            Node::Collector(c) => &c.id,
            Node::Fabric(f) => &f.id,
            Node::Host(h) => &h.id,
        }
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Source(_) => NodeKind::Source,
            Node::Collector(_) => NodeKind::Collector,
            Node::Fabric(_) => NodeKind::Fabric,
            Node::Host(_) => NodeKind::Host,
        }
    }

    /// The node's address, if it has one.
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self {
            Node::Source(s) => Some(s.address),
            Node::Collector(c) => Some(c.address),
            Node::Fabric(f) => f.address,
            Node::Host(h) => Some(h.address),
        }
    }
}
