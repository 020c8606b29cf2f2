//! Collector search tiers.
//!
//! An orphaned source looks for a new collector in widening circles: behind
//! its own fabric first, then behind the fabric's mesh neighbors, then
//! anywhere. Within a tier, collectors are tried in store enumeration order
//! and the first one that can take the source wins. A collector can take it
//! when it has room for the source plus every other source the new uplink
//! would reconnect.

use std::fmt;

use phasorgrid_topology::{Collector, NodeId, Topology};
use serde::{Deserialize, Serialize};

/// One ring of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTier {
    /// Collectors directly behind the source's fabric.
    SameFabric,
    /// Collectors behind a mesh neighbor of the source's fabric.
    NeighborFabric,
    /// Any collector. Distance is not considered.
    AnyCollector,
}

impl SearchTier {
    /// Tiers in the order they are tried.
    pub const ORDER: [SearchTier; 3] = [
        SearchTier::SameFabric,
        SearchTier::NeighborFabric,
        SearchTier::AnyCollector,
    ];

    /// Collectors this tier considers for a source on `fabric`, in
    /// enumeration order. Full collectors are included.
    pub fn candidates<'a>(
        self,
        topo: &'a Topology,
        fabric: &NodeId,
    ) -> impl Iterator<Item = &'a Collector> + 'a {
        let neighbors = topo.fabric(fabric.as_str()).map(|f| f.neighbors.as_slice()).unwrap_or(&[]);
        let fabric = fabric.clone();
        topo.collectors().filter(move |c| {
            let behind = |f: &NodeId| topo.successors(f.as_str()).any(|s| *s == c.id);
            match self {
                SearchTier::SameFabric => behind(&fabric),
                SearchTier::NeighborFabric => neighbors.iter().any(behind),
                SearchTier::AnyCollector => true,
            }
        })
    }

    /// First candidate that can take `source` through `fabric`.
    pub fn select<'a>(self, topo: &'a Topology, source: &str, fabric: &NodeId) -> Option<&'a Collector> {
        self.candidates(topo, fabric)
            .find(|c| topo.admits(source, c.id.as_str(), fabric.as_str()))
    }
}

impl fmt::Display for SearchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SameFabric => write!(f, "same-fabric"),
            Self::NeighborFabric => write!(f, "neighbor-fabric"),
            Self::AnyCollector => write!(f, "any-collector"),
        }
    }
}

/// Walk the tiers in order and return the first hit.
pub fn find_collector<'a>(
    topo: &'a Topology,
    source: &str,
    fabric: &NodeId,
) -> Option<(SearchTier, &'a Collector)> {
    SearchTier::ORDER
        .into_iter()
        .find_map(|tier| tier.select(topo, source, fabric).map(|c| (tier, c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasorgrid_topology::{RoleRules, Source};
    use std::net::Ipv4Addr;

    // s1 <-> s2 <-> s3, PDC1 (full) on s1, PDC2 on s2, PDC3 on s3.
    // PMU2 names a home it cannot reach, so it is looking for a collector.
    const RING: &str = r#"{
        "hosts": {
            "PMU1": {"ip": "10.0.1.1", "pdc": "PDC1"},
            "PMU2": {"ip": "10.0.1.2", "pdc": "PDC3"},
            "PDC1": {"ip": "10.0.2.1", "capacity": 1},
            "PDC2": {"ip": "10.0.2.2", "capacity": 1},
            "PDC3": {"ip": "10.0.2.3", "capacity": 1}
        },
        "switches": {"s1": {}, "s2": {}, "s3": {}},
        "links": [
            ["PMU1", "s1"], ["PMU2", "s1"], ["s1", "PDC1"], ["s2", "PDC2"], ["s3", "PDC3"],
            ["s1", "s2"], ["s2", "s3"]
        ]
    }"#;

    fn ring() -> Topology {
        Topology::from_json(RING, &RoleRules::default()).unwrap()
    }

    fn ids<'a>(it: impl Iterator<Item = &'a Collector>) -> Vec<&'a str> {
        it.map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn tiers_widen() {
        let t = ring();
        let s1 = NodeId::new("s1");
        assert_eq!(ids(SearchTier::SameFabric.candidates(&t, &s1)), vec!["PDC1"]);
        assert_eq!(ids(SearchTier::NeighborFabric.candidates(&t, &s1)), vec!["PDC2"]);
        assert_eq!(
            ids(SearchTier::AnyCollector.candidates(&t, &s1)),
            vec!["PDC1", "PDC2", "PDC3"]
        );
    }

    #[test]
    fn full_collectors_are_skipped() {
        let t = ring();
        let s1 = NodeId::new("s1");
        assert!(SearchTier::SameFabric.select(&t, "PMU2", &s1).is_none());
        let (tier, c) = find_collector(&t, "PMU2", &s1).unwrap();
        assert_eq!(tier, SearchTier::NeighborFabric);
        assert_eq!(c.id, "PDC2");
    }

    #[test]
    fn falls_through_to_any_collector() {
        let mut t = ring();
        t.remove_collector("PDC2").unwrap();
        let (tier, c) = find_collector(&t, "PMU2", &NodeId::new("s1")).unwrap();
        assert_eq!(tier, SearchTier::AnyCollector);
        assert_eq!(c.id, "PDC3");
    }

    #[test]
    fn uplink_that_reconnects_others_must_fit_them() {
        let mut t = ring();
        t.remove_collector("PDC2").unwrap();
        // PMU3 is homed to PDC3 too; an s1 -> PDC3 uplink would carry both
        t.add_source(Source::new("PMU3", Ipv4Addr::new(10, 0, 1, 3)).with_home("PDC3"), "s1", 1.0)
            .unwrap();
        assert!(find_collector(&t, "PMU2", &NodeId::new("s1")).is_none());
        assert!(SearchTier::AnyCollector.candidates(&t, &NodeId::new("s1")).any(|c| c.has_spare()));
    }

    #[test]
    fn connected_source_fits_its_own_home() {
        let t = ring();
        let c = SearchTier::SameFabric.select(&t, "PMU1", &NodeId::new("s1")).unwrap();
        assert_eq!(c.id, "PDC1");
    }

    #[test]
    fn unknown_fabric_only_matches_any() {
        let t = ring();
        let ghost = NodeId::new("ghost");
        assert_eq!(SearchTier::SameFabric.candidates(&t, &ghost).count(), 0);
        assert_eq!(SearchTier::NeighborFabric.candidates(&t, &ghost).count(), 0);
        assert_eq!(SearchTier::AnyCollector.candidates(&t, &ghost).count(), 3);
    }

    #[test]
    fn tier_order_is_total() {
        assert!(SearchTier::SameFabric < SearchTier::NeighborFabric);
        assert!(SearchTier::NeighborFabric < SearchTier::AnyCollector);
    }
}
