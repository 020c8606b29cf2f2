//! The topology store.
//!
//! An arena of nodes addressed by [`NodeId`]. Slots are never reused: a removed
//! node leaves a tombstone, and restored nodes are appended, so enumeration
//! always follows insertion order.
//!
//! Collector load is derived state. A source counts against its home collector
//! exactly when a `source -> fabric -> home` path exists, and every mutation
//! that can change such a path re-derives the affected loads before it
//! returns. A mutation that would push a collector past its capacity is
//! rolled back and reported as an error.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    BindError, Collector, EdgeError, Fabric, InsertError, Node, NodeId, NodeKind, NotFound, Source,
};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one store instance.
///
/// Clones get a fresh id, so caches keyed by `(StoreId, counter)` never
/// confuse two stores that happen to share a counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeIndex(usize);

#[derive(Debug, Clone)]
struct Link {
    to: NodeIndex,
    weight: f64,
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    outgoing: Vec<Link>,
    incoming: Vec<NodeIndex>,
}

/// A directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub traffic_weight: f64,
}

/// A collector that a graph edit would overflow.
pub(crate) struct Overflow {
    pub(crate) collector: NodeId,
    pub(crate) load: u32,
    pub(crate) capacity: u32,
}

/// The measurement network graph.
#[derive(Debug)]
pub struct Topology {
    id: StoreId,
    slots: Vec<Option<Slot>>,
    index: HashMap<NodeId, NodeIndex>,
    generation: u64,
    source_epoch: u64,
}

impl Clone for Topology {
    fn clone(&self) -> Self {
        Self {
            id: StoreId::next(),
            slots: self.slots.clone(),
            index: self.index.clone(),
            generation: self.generation,
            source_epoch: self.source_epoch,
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self {
            id: StoreId::next(),
            slots: Vec::new(),
            index: HashMap::new(),
            generation: 0,
            source_epoch: 0,
        }
    }

    // --- internal addressing -------------------------------------------

    fn lookup(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    fn slot(&self, idx: NodeIndex) -> Option<&Slot> {
        self.slots.get(idx.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, idx: NodeIndex) -> Option<&mut Slot> {
        self.slots.get_mut(idx.0).and_then(Option::as_mut)
    }

    fn node_at(&self, idx: NodeIndex) -> Option<&Node> {
        self.slot(idx).map(|slot| &slot.node)
    }

    fn id_at(&self, idx: NodeIndex) -> Option<&NodeId> {
        self.node_at(idx).map(Node::id)
    }

    fn kind_at(&self, idx: NodeIndex) -> Option<NodeKind> {
        self.node_at(idx).map(Node::kind)
    }

    fn is_kind(&self, idx: NodeIndex, kind: NodeKind) -> bool {
        self.kind_at(idx) == Some(kind)
    }

    fn source_at(&self, idx: NodeIndex) -> Option<&Source> {
        match self.node_at(idx) {
            Some(Node::Source(s)) => Some(s),
            _ => None,
        }
    }

    fn collector_at(&self, idx: NodeIndex) -> Option<&Collector> {
        match self.node_at(idx) {
            Some(Node::Collector(c)) => Some(c),
            _ => None,
        }
    }

    fn collector_at_mut(&mut self, idx: NodeIndex) -> Option<&mut Collector> {
        match self.slot_mut(idx).map(|slot| &mut slot.node) {
            Some(Node::Collector(c)) => Some(c),
            _ => None,
        }
    }

    fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeIndex(i))
    }

    fn successor_indices(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.slot(idx)
            .into_iter()
            .flat_map(|slot| slot.outgoing.iter().map(|link| link.to))
    }

    fn predecessor_indices(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.slot(idx)
            .into_iter()
            .flat_map(|slot| slot.incoming.iter().copied())
    }

    // --- raw graph edits (no load bookkeeping) --------------------------

    /// Append a node. Returns the id back if it is already taken.
    pub(crate) fn insert_node(&mut self, node: Node) -> Result<(), NodeId> {
        self.push(node).map(|_| ())
    }

    fn push(&mut self, node: Node) -> Result<NodeIndex, NodeId> {
        if self.index.contains_key(node.id()) {
            return Err(node.id().clone());
        }
        let idx = NodeIndex(self.slots.len());
        self.index.insert(node.id().clone(), idx);
        self.slots.push(Some(Slot {
            node,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }));
        Ok(idx)
    }

    /// Add or overwrite `from -> to`. Returns the previous weight.
    fn link(&mut self, from: NodeIndex, to: NodeIndex, weight: f64) -> Option<f64> {
        let slot = self.slot_mut(from)?;
        if let Some(existing) = slot.outgoing.iter_mut().find(|l| l.to == to) {
            return Some(std::mem::replace(&mut existing.weight, weight));
        }
        slot.outgoing.push(Link { to, weight });
        if let Some(target) = self.slot_mut(to) {
            target.incoming.push(from);
        }
        None
    }

    fn unlink(&mut self, from: NodeIndex, to: NodeIndex) -> Option<f64> {
        let slot = self.slot_mut(from)?;
        let pos = slot.outgoing.iter().position(|l| l.to == to)?;
        let removed = slot.outgoing.remove(pos);
        if let Some(target) = self.slot_mut(to) {
            target.incoming.retain(|&p| p != from);
        }
        Some(removed.weight)
    }

    fn link_weight(&self, from: NodeIndex, to: NodeIndex) -> Option<f64> {
        self.slot(from)?
            .outgoing
            .iter()
            .find(|l| l.to == to)
            .map(|l| l.weight)
    }

    fn has_link(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.link_weight(from, to).is_some()
    }

    /// Add a mutual fabric pair and record the neighbors on both sides.
    pub(crate) fn mesh(&mut self, a: &str, b: &str, weight: f64) -> Result<(), EdgeError> {
        let (ai, bi) = self.fabric_pair(a, b)?;
        self.mesh_at(ai, bi, weight);
        Ok(())
    }

    fn fabric_pair(&self, a: &str, b: &str) -> Result<(NodeIndex, NodeIndex), EdgeError> {
        let fabric = |id: &str| {
            let idx = self
                .lookup(id)
                .ok_or_else(|| EdgeError::DanglingEndpoint(NodeId::new(id)))?;
            if self.is_kind(idx, NodeKind::Fabric) {
                Ok(idx)
            } else {
                Err(EdgeError::NotAFabric(NodeId::new(id)))
            }
        };
        Ok((fabric(a)?, fabric(b)?))
    }

    fn mesh_at(&mut self, a: NodeIndex, b: NodeIndex, weight: f64) {
        self.link(a, b, weight);
        self.link(b, a, weight);
        let (Some(a_id), Some(b_id)) = (self.id_at(a).cloned(), self.id_at(b).cloned()) else {
            return;
        };
        if let Some(Node::Fabric(f)) = self.slot_mut(a).map(|s| &mut s.node) {
            f.add_neighbor(&b_id);
        }
        if let Some(Node::Fabric(f)) = self.slot_mut(b).map(|s| &mut s.node) {
            f.add_neighbor(&a_id);
        }
    }

    fn unmesh_at(&mut self, a: NodeIndex, b: NodeIndex) {
        self.unlink(a, b);
        self.unlink(b, a);
        let (Some(a_id), Some(b_id)) = (self.id_at(a).cloned(), self.id_at(b).cloned()) else {
            return;
        };
        if let Some(Node::Fabric(f)) = self.slot_mut(a).map(|s| &mut s.node) {
            f.remove_neighbor(&b_id);
        }
        if let Some(Node::Fabric(f)) = self.slot_mut(b).map(|s| &mut s.node) {
            f.remove_neighbor(&a_id);
        }
    }

    /// Drop a node and every incident edge, leaving a tombstone.
    fn purge(&mut self, idx: NodeIndex) -> Option<Node> {
        let slot = self.slots.get_mut(idx.0)?.take()?;
        for pred in &slot.incoming {
            if let Some(p) = self.slot_mut(*pred) {
                p.outgoing.retain(|l| l.to != idx);
            }
        }
        for link in &slot.outgoing {
            if let Some(s) = self.slot_mut(link.to) {
                s.incoming.retain(|&p| p != idx);
            }
        }
        self.index.remove(slot.node.id());
        Some(slot.node)
    }

    fn set_home(&mut self, idx: NodeIndex, home: Option<NodeId>) -> Option<NodeId> {
        match self.slot_mut(idx).map(|slot| &mut slot.node) {
            Some(Node::Source(s)) => std::mem::replace(&mut s.home_collector, home),
            _ => None,
        }
    }

    // --- derived load ---------------------------------------------------

    /// The home collector of a source, if a `source -> fabric -> home` path exists.
    fn connected_home(&self, source: NodeIndex) -> Option<NodeIndex> {
        let home = self.source_at(source)?.home_collector.as_ref()?;
        let home = self.lookup(home.as_str())?;
        if !self.is_kind(home, NodeKind::Collector) {
            return None;
        }
        self.successor_indices(source)
            .filter(|&f| self.is_kind(f, NodeKind::Fabric))
            .any(|f| self.has_link(f, home))
            .then_some(home)
    }

    /// Sources whose connectivity can change when edges leaving `idx` change.
    fn affected_sources(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let candidates = std::iter::once(idx).chain(self.predecessor_indices(idx));
        for candidate in candidates {
            if self.is_kind(candidate, NodeKind::Source) && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }

    fn connected_homes(&self, sources: &[NodeIndex]) -> Vec<Option<NodeIndex>> {
        sources.iter().map(|&s| self.connected_home(s)).collect()
    }

    /// Re-derive collector loads for `sources` after a graph edit.
    ///
    /// `before` holds each source's connected home prior to the edit. Loads are
    /// only written when every touched collector stays within capacity.
    fn reconcile(
        &mut self,
        sources: &[NodeIndex],
        before: &[Option<NodeIndex>],
    ) -> Result<(), Overflow> {
        let mut delta: Vec<(NodeIndex, i64)> = Vec::new();
        let mut bump = |c: NodeIndex, by: i64| match delta.iter_mut().find(|(idx, _)| *idx == c) {
            Some((_, d)) => *d += by,
            None => delta.push((c, by)),
        };
        for (&source, &prev) in sources.iter().zip(before) {
            let now = self.connected_home(source);
            if prev == now {
                continue;
            }
            if let Some(c) = prev {
                bump(c, -1);
            }
            if let Some(c) = now {
                bump(c, 1);
            }
        }

        for &(c, d) in &delta {
            if let Some(collector) = self.collector_at(c) {
                if i64::from(collector.current_load) + d > i64::from(collector.capacity) {
                    return Err(Overflow {
                        collector: collector.id.clone(),
                        load: collector.current_load,
                        capacity: collector.capacity,
                    });
                }
            }
        }
        for (c, d) in delta {
            if let Some(collector) = self.collector_at_mut(c) {
                let load = i64::from(collector.current_load) + d;
                collector.current_load = u32::try_from(load.max(0)).unwrap_or(collector.capacity);
            }
        }
        Ok(())
    }

    /// Rebuild every collector's load from the graph. Returns the first
    /// collector that ends up over capacity.
    pub(crate) fn recompute_loads(&mut self) -> Result<(), Overflow> {
        let mut loads: HashMap<NodeIndex, u32> = HashMap::new();
        let sources: Vec<NodeIndex> = self
            .indices()
            .filter(|&i| self.is_kind(i, NodeKind::Source))
            .collect();
        for s in sources {
            if let Some(c) = self.connected_home(s) {
                *loads.entry(c).or_default() += 1;
            }
        }
        let collectors: Vec<NodeIndex> = self
            .indices()
            .filter(|&i| self.is_kind(i, NodeKind::Collector))
            .collect();
        for c in collectors {
            let load = loads.get(&c).copied().unwrap_or(0);
            if let Some(collector) = self.collector_at_mut(c) {
                collector.current_load = load;
                if load > collector.capacity {
                    return Err(Overflow {
                        collector: collector.id.clone(),
                        load,
                        capacity: collector.capacity,
                    });
                }
            }
        }
        Ok(())
    }

    /// Bind every unbound source to the first collector behind one of its
    /// fabrics that still has room. Enumeration order decides ties.
    pub(crate) fn home_unbound_sources(&mut self) -> usize {
        let unbound: Vec<NodeIndex> = self
            .indices()
            .filter(|&i| self.source_at(i).is_some_and(|s| s.home_collector.is_none()))
            .collect();
        let mut homed = 0;
        for s in unbound {
            let choice = self
                .successor_indices(s)
                .filter(|&f| self.is_kind(f, NodeKind::Fabric))
                .flat_map(|f| self.successor_indices(f))
                .find(|&c| self.collector_at(c).is_some_and(Collector::has_spare));
            let Some(c) = choice else { continue };
            let home = self.id_at(c).cloned();
            self.set_home(s, home);
            if let Some(collector) = self.collector_at_mut(c) {
                collector.current_load += 1;
                homed += 1;
            }
        }
        homed
    }

    /// Where a source already links to, if somewhere other than `to`.
    fn other_attachment(&self, source: NodeIndex, to: NodeIndex) -> Option<&NodeId> {
        self.source_at(source)?;
        self.successor_indices(source)
            .find(|&n| n != to)
            .and_then(|n| self.id_at(n))
    }

    /// Existing outgoing link of `source` to anything but `to`.
    pub(crate) fn attached_elsewhere(&self, source: &str, to: &str) -> Option<&NodeId> {
        let s = self.lookup(source)?;
        let t = self.lookup(to)?;
        self.other_attachment(s, t)
    }

    pub(crate) fn link_ids(&mut self, from: &str, to: &str, weight: f64) -> bool {
        match (self.lookup(from), self.lookup(to)) {
            (Some(a), Some(b)) => {
                self.link(a, b, weight);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_home_id(&mut self, source: &str, home: NodeId) {
        if let Some(idx) = self.lookup(source) {
            self.set_home(idx, Some(home));
        }
    }

    // --- queries ----------------------------------------------------------

    /// Identity of this store instance.
    pub fn store_id(&self) -> StoreId {
        self.id
    }

    /// Counter bumped by every successful mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Counter bumped only when the set of sources changes.
    pub fn source_epoch(&self) -> u64 {
        self.source_epoch
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.lookup(id).and_then(|i| self.node_at(i))
    }

    pub fn kind(&self, id: &str) -> Option<NodeKind> {
        self.node(id).map(Node::kind)
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.lookup(id).and_then(|i| self.source_at(i))
    }

    pub fn collector(&self, id: &str) -> Option<&Collector> {
        self.lookup(id).and_then(|i| self.collector_at(i))
    }

    pub fn fabric(&self, id: &str) -> Option<&Fabric> {
        match self.node(id) {
            Some(Node::Fabric(f)) => Some(f),
            _ => None,
        }
    }

    /// Every live node in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.slots.iter().flatten().map(|slot| &slot.node)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> + '_ {
        self.nodes().filter_map(|n| match n {
            Node::Source(s) => Some(s),
            _ => None,
        })
    }

    pub fn collectors(&self) -> impl Iterator<Item = &Collector> + '_ {
        self.nodes().filter_map(|n| match n {
            Node::Collector(c) => Some(c),
            _ => None,
        })
    }

    pub fn fabrics(&self) -> impl Iterator<Item = &Fabric> + '_ {
        self.nodes().filter_map(|n| match n {
            Node::Fabric(f) => Some(f),
            _ => None,
        })
    }

    /// Direct successors of `id`, in edge insertion order. Empty for unknown ids.
    pub fn successors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a NodeId> + 'a {
        let idx = self.lookup(id);
        idx.into_iter()
            .flat_map(move |i| self.successor_indices(i))
            .filter_map(move |i| self.id_at(i))
    }

    /// Direct predecessors of `id`. Empty for unknown ids.
    pub fn predecessors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a NodeId> + 'a {
        let idx = self.lookup(id);
        idx.into_iter()
            .flat_map(move |i| self.predecessor_indices(i))
            .filter_map(move |i| self.id_at(i))
    }

    /// Every edge, grouped by source node in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.slots.iter().flatten().flat_map(move |slot| {
            slot.outgoing.iter().filter_map(move |link| {
                Some(Edge {
                    from: slot.node.id().clone(),
                    to: self.id_at(link.to)?.clone(),
                    traffic_weight: link.weight,
                })
            })
        })
    }

    pub fn edge_count(&self) -> usize {
        self.slots.iter().flatten().map(|slot| slot.outgoing.len()).sum()
    }

    pub fn edge_weight(&self, from: &str, to: &str) -> Option<f64> {
        self.link_weight(self.lookup(from)?, self.lookup(to)?)
    }

    /// The fabric a source hangs off, with the attachment weight.
    pub fn attachment(&self, source: &str) -> Option<(&NodeId, f64)> {
        let s = self.lookup(source)?;
        self.source_at(s)?;
        self.slot(s)?
            .outgoing
            .iter()
            .find(|l| self.is_kind(l.to, NodeKind::Fabric))
            .and_then(|l| Some((self.id_at(l.to)?, l.weight)))
    }

    /// Whether `source` currently has a path to its home collector.
    pub fn is_connected(&self, source: &str) -> bool {
        self.lookup(source)
            .and_then(|s| self.connected_home(s))
            .is_some()
    }

    /// Sources counted against `collector`'s load, in discovery order.
    pub fn bound_sources(&self, collector: &str) -> Vec<&NodeId> {
        let Some(c) = self.lookup(collector) else {
            return Vec::new();
        };
        let mut out: Vec<&NodeId> = Vec::new();
        for fabric in self.predecessor_indices(c) {
            if !self.is_kind(fabric, NodeKind::Fabric) {
                continue;
            }
            for s in self.predecessor_indices(fabric) {
                if self.connected_home(s) != Some(c) {
                    continue;
                }
                if let Some(id) = self.id_at(s) {
                    if !out.contains(&id) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// Total unused capacity across all collectors.
    pub fn spare_capacity(&self) -> u32 {
        self.collectors().map(Collector::spare).sum()
    }

    /// Whether `bind(source, collector, via)` would fit.
    ///
    /// A new `via -> collector` uplink also reconnects every other source on
    /// `via` that is homed to `collector`, and each of those needs a slot too.
    pub fn admits(&self, source: &str, collector: &str, via: &str) -> bool {
        let (Some(s), Some(c), Some(f)) = (self.lookup(source), self.lookup(collector), self.lookup(via))
        else {
            return false;
        };
        let Some(target) = self.collector_at(c) else {
            return false;
        };
        if self.source_at(s).is_none() || !self.is_kind(f, NodeKind::Fabric) || !self.has_link(s, f) {
            return false;
        }

        let mut needed = usize::from(self.connected_home(s) != Some(c));
        if !self.has_link(f, c) {
            needed += self
                .predecessor_indices(f)
                .filter(|&p| p != s && self.connected_home(p) != Some(c))
                .filter(|&p| self.source_at(p).is_some_and(|o| o.is_homed_to(collector)))
                .count();
        }
        target.current_load as usize + needed <= target.capacity as usize
    }

    // --- mutations --------------------------------------------------------

    /// Add `from -> to`, overwriting the weight of an identical edge.
    ///
    /// A fabric-to-fabric edge is stored as a mutual mesh pair. A source has
    /// exactly one outgoing link; a second one is rejected.
    pub fn add_edge(&mut self, from: &str, to: &str, weight: f64) -> Result<(), EdgeError> {
        let a = self
            .lookup(from)
            .ok_or_else(|| EdgeError::DanglingEndpoint(NodeId::new(from)))?;
        let b = self
            .lookup(to)
            .ok_or_else(|| EdgeError::DanglingEndpoint(NodeId::new(to)))?;
        if let Some(attached) = self.other_attachment(a, b) {
            return Err(EdgeError::AlreadyAttached {
                source_id: NodeId::new(from),
                attached: attached.clone(),
            });
        }

        if self.is_kind(a, NodeKind::Fabric) && self.is_kind(b, NodeKind::Fabric) {
            self.mesh_at(a, b, weight);
        } else {
            let affected = self.affected_sources(a);
            let before = self.connected_homes(&affected);
            let previous = self.link(a, b, weight);
            if let Err(over) = self.reconcile(&affected, &before) {
                match previous {
                    Some(w) => {
                        self.link(a, b, w);
                    }
                    None => {
                        self.unlink(a, b);
                    }
                }
                return Err(EdgeError::WouldExceedCapacity {
                    collector: over.collector,
                    capacity: over.capacity,
                });
            }
        }
        self.generation += 1;
        debug!("edge {} -> {} (weight {})", from, to, weight);
        Ok(())
    }

    /// Add a mutual link between two fabrics.
    pub fn add_mesh_link(&mut self, a: &str, b: &str, weight: f64) -> Result<(), EdgeError> {
        self.mesh(a, b, weight)?;
        self.generation += 1;
        debug!("mesh {} <-> {}", a, b);
        Ok(())
    }

    /// Remove `from -> to`. A mesh link is removed in both directions.
    ///
    /// Sources that lose their path home stop counting against their collector.
    pub fn remove_edge(&mut self, from: &str, to: &str) -> Result<(), EdgeError> {
        let no_such = || EdgeError::NoSuchEdge {
            from: NodeId::new(from),
            to: NodeId::new(to),
        };
        let (Some(a), Some(b)) = (self.lookup(from), self.lookup(to)) else {
            return Err(no_such());
        };
        if !self.has_link(a, b) {
            return Err(no_such());
        }

        if self.is_kind(a, NodeKind::Fabric) && self.is_kind(b, NodeKind::Fabric) {
            self.unmesh_at(a, b);
        } else {
            let affected = self.affected_sources(a);
            let before = self.connected_homes(&affected);
            let weight = self.unlink(a, b);
            if let Err(over) = self.reconcile(&affected, &before) {
                if let Some(w) = weight {
                    self.link(a, b, w);
                }
                return Err(EdgeError::WouldExceedCapacity {
                    collector: over.collector,
                    capacity: over.capacity,
                });
            }
        }
        self.generation += 1;
        debug!("removed edge {} -> {}", from, to);
        Ok(())
    }

    /// Delete a collector and every incident edge. Source homes are left alone.
    pub fn remove_collector(&mut self, id: &str) -> Result<Ipv4Addr, NotFound> {
        let idx = self
            .lookup(id)
            .filter(|&i| self.is_kind(i, NodeKind::Collector))
            .ok_or_else(|| NotFound(NodeId::new(id)))?;
        let Some(Node::Collector(collector)) = self.purge(idx) else {
            return Err(NotFound(NodeId::new(id)));
        };
        self.generation += 1;
        info!(
            "removed collector {} ({}), {} source(s) orphaned",
            collector.id, collector.address, collector.current_load
        );
        Ok(collector.address)
    }

    /// Commit a route: bind `source` to `collector` through `via`.
    ///
    /// Adds the `via -> collector` uplink if missing and sets the source's
    /// home. Nothing changes if the collector cannot take the source.
    pub fn bind(
        &mut self,
        source: &str,
        collector: &str,
        via: &str,
        weight: f64,
    ) -> Result<(), BindError> {
        let s = self
            .lookup(source)
            .filter(|&i| self.is_kind(i, NodeKind::Source))
            .ok_or_else(|| BindError::UnknownSource(NodeId::new(source)))?;
        let c = self
            .lookup(collector)
            .filter(|&i| self.is_kind(i, NodeKind::Collector))
            .ok_or_else(|| BindError::UnknownCollector(NodeId::new(collector)))?;
        let f = self
            .lookup(via)
            .filter(|&i| self.is_kind(i, NodeKind::Fabric) && self.has_link(s, i))
            .ok_or_else(|| BindError::NotAttached {
                source_id: NodeId::new(source),
                fabric: NodeId::new(via),
            })?;

        let affected = self.affected_sources(f);
        let before = self.connected_homes(&affected);
        let previous_home = self.set_home(s, Some(NodeId::new(collector)));
        let added = !self.has_link(f, c);
        if added {
            self.link(f, c, weight);
        }
        if let Err(over) = self.reconcile(&affected, &before) {
            self.set_home(s, previous_home);
            if added {
                self.unlink(f, c);
            }
            return Err(BindError::CapacityViolation {
                collector: over.collector,
                load: over.load,
                capacity: over.capacity,
            });
        }
        self.generation += 1;
        debug!("bound {} to {} via {}", source, collector, via);
        Ok(())
    }

    /// Insert a fabric node.
    pub fn add_fabric(&mut self, fabric: Fabric) -> Result<(), InsertError> {
        self.push(Node::Fabric(fabric)).map_err(InsertError::DuplicateId)?;
        self.generation += 1;
        Ok(())
    }

    /// Insert a source attached to `fabric`.
    ///
    /// If the source names a home that is reachable through `fabric`, it
    /// counts against that collector immediately.
    pub fn add_source(&mut self, source: Source, fabric: &str, weight: f64) -> Result<(), InsertError> {
        if self.contains(source.id.as_str()) {
            return Err(InsertError::DuplicateId(source.id));
        }
        let f = self
            .lookup(fabric)
            .filter(|&i| self.is_kind(i, NodeKind::Fabric))
            .ok_or_else(|| InsertError::NotAFabric(NodeId::new(fabric)))?;
        let id = source.id.clone();
        let s = self.push(Node::Source(source)).map_err(InsertError::DuplicateId)?;
        self.link(s, f, weight);
        if let Err(over) = self.reconcile(&[s], &[None]) {
            self.purge(s);
            return Err(InsertError::WouldExceedCapacity {
                collector: over.collector,
                capacity: over.capacity,
            });
        }
        self.generation += 1;
        self.source_epoch += 1;
        debug!("added source {} on {}", id, fabric);
        Ok(())
    }

    /// Re-insert a collector that came back online.
    ///
    /// The load is reset and re-derived from the sources still homed to it.
    /// `uplinks` are `(fabric, weight)` pairs. If the uplinks reconnect more
    /// homed sources than the collector holds, the first ones in enumeration
    /// order are kept and the rest lose their home. Those are returned so
    /// they can be routed elsewhere.
    pub fn restore_collector(
        &mut self,
        mut collector: Collector,
        uplinks: &[(&str, f64)],
    ) -> Result<Vec<NodeId>, InsertError> {
        if self.contains(collector.id.as_str()) {
            return Err(InsertError::DuplicateId(collector.id));
        }
        let mut fabrics = Vec::with_capacity(uplinks.len());
        for &(fabric, weight) in uplinks {
            let f = self
                .lookup(fabric)
                .filter(|&i| self.is_kind(i, NodeKind::Fabric))
                .ok_or_else(|| InsertError::NotAFabric(NodeId::new(fabric)))?;
            fabrics.push((f, weight));
        }

        let homed: Vec<NodeIndex> = self
            .indices()
            .filter(|&i| self.source_at(i).is_some_and(|s| s.is_homed_to(collector.id.as_str())))
            .collect();

        collector.current_load = 0;
        let capacity = collector.capacity;
        let id = collector.id.clone();
        let c = self.push(Node::Collector(collector)).map_err(InsertError::DuplicateId)?;
        for (f, weight) in fabrics {
            self.link(f, c, weight);
        }

        let mut load = 0;
        let mut released = Vec::new();
        for s in homed {
            if self.connected_home(s) != Some(c) {
                continue;
            }
            if load < capacity {
                load += 1;
            } else {
                self.set_home(s, None);
                released.extend(self.id_at(s).cloned());
            }
        }
        if let Some(restored) = self.collector_at_mut(c) {
            restored.current_load = load;
        }
        self.generation += 1;
        info!("restored collector {} with {} uplink(s)", id, uplinks.len());
        if !released.is_empty() {
            info!("{} has room for {} source(s), released {}", id, capacity, released.len());
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    /// s1 <-> s2, PDC_A (cap 2) and PDC_B (cap 1) behind s1, PDC_C (cap 2) behind s2.
    fn small() -> Topology {
        let mut t = Topology::new();
        t.add_fabric(Fabric::new("s1")).unwrap();
        t.add_fabric(Fabric::new("s2")).unwrap();
        t.add_mesh_link("s1", "s2", 1.0).unwrap();
        t.restore_collector(Collector::new("PDC_A", ip(21), 2), &[("s1", 1.0)]).unwrap();
        t.restore_collector(Collector::new("PDC_B", ip(22), 1), &[("s1", 1.0)]).unwrap();
        t.restore_collector(Collector::new("PDC_C", ip(23), 2), &[("s2", 1.0)]).unwrap();
        t.add_source(Source::new("PMU1", ip(11)).with_home("PDC_A"), "s1", 2.0).unwrap();
        t.add_source(Source::new("PMU2", ip(12)).with_home("PDC_A"), "s1", 2.0).unwrap();
        t
    }

    fn assert_loads_derived(t: &Topology) {
        for c in t.collectors() {
            assert!(c.current_load <= c.capacity, "{} over capacity", c.id);
            assert_eq!(
                t.bound_sources(c.id.as_str()).len() as u32,
                c.current_load,
                "derived load mismatch on {}",
                c.id
            );
        }
    }

    #[test]
    fn initial_loads_follow_homes() {
        let t = small();
        assert_eq!(t.collector("PDC_A").unwrap().current_load, 2);
        assert_eq!(t.collector("PDC_B").unwrap().current_load, 0);
        assert!(t.is_connected("PMU1"));
        assert_loads_derived(&t);
    }

    #[test]
    fn enumeration_is_insertion_order() {
        let t = small();
        let ids: Vec<_> = t.nodes().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "PDC_A", "PDC_B", "PDC_C", "PMU1", "PMU2"]);
    }

    #[test]
    fn mesh_links_are_mutual() {
        let t = small();
        assert_eq!(t.fabric("s1").unwrap().neighbors, vec![NodeId::new("s2")]);
        assert_eq!(t.fabric("s2").unwrap().neighbors, vec![NodeId::new("s1")]);
        assert!(t.edge_weight("s2", "s1").is_some());
    }

    #[test]
    fn iterators_are_restartable() {
        let t = small();
        let first: Vec<_> = t.successors("s1").collect();
        let second: Vec<_> = t.successors("s1").collect();
        assert_eq!(first, second);
        assert_eq!(t.successors("nope").count(), 0);
        assert_eq!(t.predecessors("PDC_A").collect::<Vec<_>>(), vec!["s1"]);
    }

    #[test]
    fn remove_collector_drops_incident_edges() {
        let mut t = small();
        let before = t.edge_count();
        let addr = t.remove_collector("PDC_A").unwrap();
        assert_eq!(addr, ip(21));
        assert!(!t.contains("PDC_A"));
        assert_eq!(t.edge_count(), before - 1);
        assert!(t.successors("s1").all(|id| id != "PDC_A"));
        // homes are untouched
        assert!(t.source("PMU1").unwrap().is_homed_to("PDC_A"));
        assert!(!t.is_connected("PMU1"));
        assert_loads_derived(&t);
    }

    #[test]
    fn remove_collector_rejects_non_collectors() {
        let mut t = small();
        assert_eq!(t.remove_collector("s1"), Err(NotFound(NodeId::new("s1"))));
        assert_eq!(t.remove_collector("ghost"), Err(NotFound(NodeId::new("ghost"))));
        assert!(t.contains("s1"));
    }

    #[test]
    fn removed_slot_is_not_reused() {
        let mut t = small();
        t.remove_collector("PDC_B").unwrap();
        t.restore_collector(Collector::new("PDC_B", ip(22), 1), &[("s1", 1.0)]).unwrap();
        let last = t.nodes().last().unwrap();
        assert_eq!(last.id(), "PDC_B");
    }

    #[test]
    fn add_edge_overwrites_weight() {
        let mut t = small();
        t.add_edge("PMU1", "s1", 7.5).unwrap();
        assert_eq!(t.edge_weight("PMU1", "s1"), Some(7.5));
        assert_eq!(t.successors("PMU1").count(), 1);
    }

    #[test]
    fn add_edge_rejects_dangling() {
        let mut t = small();
        let gen = t.generation();
        assert_eq!(
            t.add_edge("s1", "ghost", 1.0),
            Err(EdgeError::DanglingEndpoint(NodeId::new("ghost")))
        );
        assert_eq!(t.generation(), gen);
    }

    #[test]
    fn bind_moves_load() {
        let mut t = small();
        t.remove_collector("PDC_A").unwrap();
        t.bind("PMU1", "PDC_B", "s1", 2.0).unwrap();
        assert_eq!(t.collector("PDC_B").unwrap().current_load, 1);
        assert!(t.source("PMU1").unwrap().is_homed_to("PDC_B"));
        assert_loads_derived(&t);
    }

    #[test]
    fn bind_rejects_full_collector_without_changes() {
        let mut t = small();
        t.remove_collector("PDC_A").unwrap();
        t.bind("PMU1", "PDC_B", "s1", 2.0).unwrap();
        let gen = t.generation();
        let err = t.bind("PMU2", "PDC_B", "s1", 2.0).unwrap_err();
        assert_eq!(
            err,
            BindError::CapacityViolation {
                collector: NodeId::new("PDC_B"),
                load: 1,
                capacity: 1
            }
        );
        assert!(t.source("PMU2").unwrap().is_homed_to("PDC_A"));
        assert_eq!(t.generation(), gen);
        assert_loads_derived(&t);
    }

    #[test]
    fn bind_across_fabric_adds_uplink() {
        let mut t = small();
        t.remove_collector("PDC_A").unwrap();
        t.bind("PMU1", "PDC_C", "s1", 2.0).unwrap();
        assert_eq!(t.edge_weight("s1", "PDC_C"), Some(2.0));
        assert!(t.is_connected("PMU1"));
        assert_loads_derived(&t);
    }

    #[test]
    fn bind_requires_attachment() {
        let mut t = small();
        assert!(matches!(
            t.bind("PMU1", "PDC_C", "s2", 1.0),
            Err(BindError::NotAttached { .. })
        ));
        assert!(matches!(
            t.bind("s1", "PDC_C", "s2", 1.0),
            Err(BindError::UnknownSource(_))
        ));
    }

    #[test]
    fn remove_uplink_releases_load() {
        let mut t = small();
        t.remove_edge("s1", "PDC_A").unwrap();
        assert_eq!(t.collector("PDC_A").unwrap().current_load, 0);
        assert!(!t.is_connected("PMU2"));
        assert_loads_derived(&t);

        assert!(matches!(
            t.remove_edge("s1", "PDC_A"),
            Err(EdgeError::NoSuchEdge { .. })
        ));
    }

    #[test]
    fn reconnecting_edge_checks_capacity() {
        let mut t = small();
        t.remove_edge("s1", "PDC_A").unwrap();
        t.bind("PMU1", "PDC_B", "s1", 1.0).unwrap();
        // PMU2 is still homed to PDC_A; reconnecting it fits.
        t.add_edge("s1", "PDC_A", 1.0).unwrap();
        assert_eq!(t.collector("PDC_A").unwrap().current_load, 1);
        assert_loads_derived(&t);
    }

    #[test]
    fn restore_collector_recounts_homed_sources() {
        let mut t = small();
        t.remove_collector("PDC_A").unwrap();
        t.restore_collector(Collector::new("PDC_A", ip(21), 2), &[("s1", 1.0)]).unwrap();
        assert_eq!(t.collector("PDC_A").unwrap().current_load, 2);
        assert_loads_derived(&t);
    }

    #[test]
    fn degraded_restore_keeps_what_fits() {
        let mut t = small();
        t.remove_collector("PDC_A").unwrap();
        let released = t
            .restore_collector(Collector::new("PDC_A", ip(21), 1), &[("s1", 1.0)])
            .unwrap();
        assert_eq!(released, vec![NodeId::new("PMU2")]);
        assert_eq!(t.collector("PDC_A").unwrap().current_load, 1);
        assert!(t.is_connected("PMU1"));
        assert!(t.source("PMU2").unwrap().home_collector.is_none());
        assert!(!t.is_connected("PMU2"));
        assert_loads_derived(&t);
    }

    #[test]
    fn source_takes_a_single_link() {
        let mut t = small();
        let gen = t.generation();
        assert_eq!(
            t.add_edge("PMU1", "s2", 1.0),
            Err(EdgeError::AlreadyAttached {
                source_id: NodeId::new("PMU1"),
                attached: NodeId::new("s1"),
            })
        );
        assert!(matches!(
            t.add_edge("PMU1", "PDC_C", 1.0),
            Err(EdgeError::AlreadyAttached { .. })
        ));
        assert_eq!(t.successors("PMU1").collect::<Vec<_>>(), vec!["s1"]);
        assert_eq!(t.generation(), gen);
    }

    #[test]
    fn admits_counts_sources_a_new_uplink_reconnects() {
        let mut t = small();
        // PMU3 on s1 is homed to PDC_C but s1 has no uplink to it
        t.add_source(Source::new("PMU3", ip(13)).with_home("PDC_C"), "s1", 1.0).unwrap();
        t.add_source(Source::new("PMU4", ip(14)).with_home("PDC_C"), "s2", 1.0).unwrap();
        t.remove_collector("PDC_A").unwrap();
        assert!(!t.is_connected("PMU3"));
        assert_eq!(t.collector("PDC_C").unwrap().current_load, 1);

        // PMU1 plus PMU3 would need two slots, PDC_C has one
        assert!(!t.admits("PMU1", "PDC_C", "s1"));
        assert!(matches!(
            t.bind("PMU1", "PDC_C", "s1", 1.0),
            Err(BindError::CapacityViolation { .. })
        ));
        // PMU3 alone fits
        assert!(t.admits("PMU3", "PDC_C", "s1"));
        assert!(t.admits("PMU1", "PDC_B", "s1"));
        assert!(!t.admits("PMU1", "PDC_B", "s2"));
        assert!(!t.admits("s1", "PDC_B", "s1"));
    }

    #[test]
    fn restore_collector_rejects_duplicates() {
        let mut t = small();
        assert_eq!(
            t.restore_collector(Collector::new("s1", ip(99), 1), &[]),
            Err(InsertError::DuplicateId(NodeId::new("s1")))
        );
    }

    #[test]
    fn source_epoch_only_moves_with_sources() {
        let mut t = small();
        let epoch = t.source_epoch();
        t.remove_collector("PDC_B").unwrap();
        assert_eq!(t.source_epoch(), epoch);
        t.add_source(Source::new("PMU3", ip(13)), "s2", 1.0).unwrap();
        assert_eq!(t.source_epoch(), epoch + 1);
    }

    #[test]
    fn clone_gets_fresh_identity() {
        let t = small();
        let copy = t.clone();
        assert_ne!(t.store_id(), copy.store_id());
        assert_eq!(t.generation(), copy.generation());
    }

    #[test]
    fn attachment_reports_fabric_and_weight() {
        let t = small();
        let (fabric, weight) = t.attachment("PMU1").unwrap();
        assert_eq!(fabric, "s1");
        assert_eq!(weight, 2.0);
        assert!(t.attachment("PDC_A").is_none());
    }

    #[test]
    fn spare_capacity_sums_collectors() {
        let t = small();
        assert_eq!(t.spare_capacity(), 3);
    }
}
