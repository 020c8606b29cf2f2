//! Serializable dumps of a topology for diagnostics.

use serde::{Deserialize, Serialize};

use crate::{Collector, Edge, Node, StoreId, Topology};

/// Point-in-time copy of every node and edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub store: StoreId,
    pub generation: u64,
    pub source_epoch: u64,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl TopologySnapshot {
    /// Collectors in the snapshot, with their loads.
    pub fn collectors(&self) -> impl Iterator<Item = &Collector> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Collector(c) => Some(c),
            _ => None,
        })
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id().as_str() == id)
    }
}

impl Topology {
    /// Copy the current state out of the store.
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            store: self.store_id(),
            generation: self.generation(),
            source_epoch: self.source_epoch(),
            nodes: self.nodes().cloned().collect(),
            edges: self.edges().collect(),
        }
    }
}
