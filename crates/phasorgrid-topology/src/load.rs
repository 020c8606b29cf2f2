//! Building a [`Topology`] from a [`TopologyDescription`].

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::address::{parse_address, HostRole, RoleRules};
use crate::description::{HostSpec, SwitchSpec, TopologyDescription};
use crate::{Collector, Fabric, Host, LoadError, Node, NodeId, NodeKind, Result, Source, Topology};

/// Capacity of collectors that do not declare one.
pub const DEFAULT_COLLECTOR_CAPACITY: u32 = 3;

impl Topology {
    /// Build a topology from a parsed description.
    ///
    /// Loading is all-or-nothing. Sources with an explicit home keep it even
    /// if it is unreachable (they start disconnected); the rest are homed to
    /// the first collector behind their fabric that has room.
    pub fn load(desc: &TopologyDescription, rules: &RoleRules) -> Result<Topology> {
        let mut topo = Topology::new();
        let mut homes: Vec<(NodeId, NodeId)> = Vec::new();

        for (key, spec) in &desc.hosts {
            let (node, home) = host_node(key, spec, rules)?;
            topo.insert_node(node).map_err(LoadError::DuplicateId)?;
            if let Some(home) = home {
                homes.push((NodeId::new(key.as_str()), home));
            }
        }
        for (key, spec) in &desc.switches {
            topo.insert_node(Node::Fabric(switch_node(key, spec)?))
                .map_err(LoadError::DuplicateId)?;
        }

        for (position, link) in desc.links.iter().enumerate() {
            let malformed = |reason: String| LoadError::MalformedLink { position, reason };
            let (a, b, weight) = link.resolve().map_err(malformed)?;
            let (Some(ka), Some(kb)) = (topo.kind(a.as_str()), topo.kind(b.as_str())) else {
                let missing = if topo.contains(a.as_str()) { &b } else { &a };
                return Err(malformed(format!("unknown endpoint `{missing}`")));
            };
            let (from, to) = match (ka, kb) {
                (NodeKind::Fabric, NodeKind::Fabric) => {
                    topo.mesh(a.as_str(), b.as_str(), weight)
                        .map_err(|e| malformed(e.to_string()))?;
                    continue;
                }
                (NodeKind::Fabric, NodeKind::Source) | (NodeKind::Collector, NodeKind::Fabric) => (b, a),
                _ => (a, b),
            };
            if let Some(attached) = topo.attached_elsewhere(from.as_str(), to.as_str()) {
                return Err(malformed(format!("source `{from}` is already attached to `{attached}`")));
            }
            topo.link_ids(from.as_str(), to.as_str(), weight);
        }

        let mut seen = HashSet::new();
        for (source, home) in homes {
            if topo.kind(home.as_str()) != Some(NodeKind::Collector) {
                return Err(LoadError::InvalidHome { source_id: source, home });
            }
            seen.insert(source.clone());
            topo.set_home_id(source.as_str(), home);
        }
        topo.recompute_loads().map_err(|over| LoadError::OverCapacity {
            collector: over.collector,
            load: over.load,
            capacity: over.capacity,
        })?;
        let homed = topo.home_unbound_sources();

        let sources = topo.sources().count();
        let disconnected = topo
            .sources()
            .filter(|s| !topo.is_connected(s.id.as_str()))
            .count();
        info!(
            "Loaded topology: {} sources, {} collectors, {} fabrics, {} edges",
            sources,
            topo.collectors().count(),
            topo.fabrics().count(),
            topo.edge_count()
        );
        debug!(
            "{} explicit homes, {} assigned on load, {} disconnected",
            seen.len(),
            homed,
            disconnected
        );
        Ok(topo)
    }

    /// Parse a JSON description and load it.
    pub fn from_json(json: &str, rules: &RoleRules) -> Result<Topology> {
        let desc: TopologyDescription = serde_json::from_str(json)?;
        Self::load(&desc, rules)
    }

    /// Read a JSON description from disk and load it.
    pub fn from_path(path: impl AsRef<Path>, rules: &RoleRules) -> Result<Topology> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        debug!("Read topology from {}", path.as_ref().display());
        Self::from_json(&raw, rules)
    }
}

fn host_node(key: &str, spec: &HostSpec, rules: &RoleRules) -> Result<(Node, Option<NodeId>)> {
    let id = NodeId::new(key);
    let unknown = |reason: String| LoadError::UnknownEntityKind { id: id.clone(), reason };

    let address = parse_address(&spec.ip)
        .ok_or_else(|| unknown(format!("unparsable address `{}`", spec.ip)))?;
    let role = match &spec.role {
        Some(role) => role.parse::<HostRole>().map_err(unknown)?,
        None => rules.classify(address),
    };

    let node = match role {
        HostRole::Source => {
            let source = Source::new(id.clone(), address)
                .with_direct_buses(spec.direct_buses.iter().map(String::as_str))
                .with_adjacent_buses(spec.adjacent_buses.iter().map(String::as_str));
            let home = spec.home.as_deref().map(NodeId::new);
            return Ok((Node::Source(source), home));
        }
        HostRole::Collector => Node::Collector(Collector::new(
            id,
            address,
            spec.capacity.unwrap_or(DEFAULT_COLLECTOR_CAPACITY),
        )),
        HostRole::Host => Node::Host(Host {
            id,
            address,
            mac: spec.mac.clone(),
        }),
    };
    Ok((node, None))
}

fn switch_node(key: &str, spec: &SwitchSpec) -> Result<Fabric> {
    let mut fabric = Fabric::new(key);
    if let Some(raw) = &spec.ip {
        let address = parse_address(raw).ok_or_else(|| LoadError::UnknownEntityKind {
            id: NodeId::new(key),
            reason: format!("unparsable switch address `{raw}`"),
        })?;
        fabric.address = Some(address);
    }
    if let Some(cap) = spec.ingress_capacity {
        fabric.ingress_capacity = cap;
    }
    if let Some(cap) = spec.egress_capacity {
        fabric.egress_capacity = cap;
    }
    Ok(fabric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NET: &str = r#"{
        "hosts": {
            "h1": {"ip": "10.0.1.1/24", "dir_busses": ["Bus1"], "adj_busses": ["Bus2"]},
            "h2": {"ip": "10.0.1.2/24", "dir_busses": ["Bus2"]},
            "h3": {"ip": "10.0.2.3/24", "capacity": 1},
            "h4": {"ip": "10.0.2.4/24"},
            "h9": {"ip": "10.0.9.9/24", "mac": "08:00:00:00:09:99"}
        },
        "switches": {"s1": {"Icapacity": 4}, "s2": {}},
        "links": [
            ["s1-p1", "h1"], ["h2", "s1-p2"],
            ["h3", "s1-p3"], ["s2-p1", "h4", 2.0],
            ["s1-p4", "s2-p2"], ["h9", "s2-p3"]
        ]
    }"#;

    fn load(json: &str) -> Result<Topology> {
        Topology::from_json(json, &RoleRules::default())
    }

    #[test]
    fn classifies_and_normalizes() {
        let t = load(NET).unwrap();
        assert_eq!(t.kind("h1"), Some(NodeKind::Source));
        assert_eq!(t.kind("h3"), Some(NodeKind::Collector));
        assert_eq!(t.kind("h9"), Some(NodeKind::Host));
        assert_eq!(t.kind("s1"), Some(NodeKind::Fabric));

        // link direction follows roles, not document order
        assert!(t.edge_weight("h1", "s1").is_some());
        assert!(t.edge_weight("s1", "h3").is_some());
        assert_eq!(t.edge_weight("s2", "h4"), Some(2.0));
        assert_eq!(t.fabric("s1").unwrap().neighbors, vec![NodeId::new("s2")]);
        assert_eq!(t.fabric("s1").unwrap().ingress_capacity, 4);
        assert_eq!(t.fabric("s2").unwrap().egress_capacity, Fabric::DEFAULT_CAPACITY);
        assert_eq!(t.collector("h4").unwrap().capacity, DEFAULT_COLLECTOR_CAPACITY);
    }

    #[test]
    fn implicit_homing_respects_capacity() {
        let t = load(NET).unwrap();
        // h3 (cap 1) takes h1; h2 has no other collector behind s1
        assert!(t.source("h1").unwrap().is_homed_to("h3"));
        assert!(t.source("h2").unwrap().home_collector.is_none());
        assert!(!t.is_connected("h2"));
        assert_eq!(t.collector("h3").unwrap().current_load, 1);
    }

    #[test]
    fn explicit_home_may_be_unreachable() {
        let json = NET.replace(
            r#""h2": {"ip": "10.0.1.2/24","#,
            r#""h2": {"ip": "10.0.1.2/24", "pdc": "h4","#,
        );
        let t = load(&json).unwrap();
        assert!(t.source("h2").unwrap().is_homed_to("h4"));
        assert!(!t.is_connected("h2"));
        assert_eq!(t.collector("h4").unwrap().current_load, 0);
    }

    #[test]
    fn home_must_be_a_collector() {
        let json = NET.replace(
            r#""h2": {"ip": "10.0.1.2/24","#,
            r#""h2": {"ip": "10.0.1.2/24", "home": "s1","#,
        );
        assert!(matches!(load(&json), Err(LoadError::InvalidHome { .. })));
    }

    #[test]
    fn explicit_homes_over_capacity_fail() {
        let json = NET
            .replace(r#""h1": {"ip": "10.0.1.1/24","#, r#""h1": {"ip": "10.0.1.1/24", "home": "h3","#)
            .replace(r#""h2": {"ip": "10.0.1.2/24","#, r#""h2": {"ip": "10.0.1.2/24", "home": "h3","#);
        assert!(matches!(load(&json), Err(LoadError::OverCapacity { load: 2, capacity: 1, .. })));
    }

    #[test]
    fn unknown_link_endpoint_is_malformed() {
        let json = NET.replace(r#"["h9", "s2-p3"]"#, r#"["h9", "s7-p3"]"#);
        match load(&json) {
            Err(LoadError::MalformedLink { position, reason }) => {
                assert_eq!(position, 5);
                assert!(reason.contains("s7"));
            }
            other => panic!("expected MalformedLink, got {other:?}"),
        }
    }

    #[test]
    fn source_on_two_fabrics_is_malformed() {
        let json = NET.replace(r#"["h9", "s2-p3"]"#, r#"["h9", "s2-p3"], ["h1", "s2-p4"]"#);
        match load(&json) {
            Err(LoadError::MalformedLink { position, reason }) => {
                assert_eq!(position, 6);
                assert!(reason.contains("already attached to `s1`"));
            }
            other => panic!("expected MalformedLink, got {other:?}"),
        }

        let direct = NET.replace(r#"["h9", "s2-p3"]"#, r#"["h9", "s2-p3"], ["h2", "h4"]"#);
        assert!(matches!(load(&direct), Err(LoadError::MalformedLink { .. })));
    }

    #[test]
    fn repeated_attachment_only_updates_weight() {
        let json = NET.replace(r#"["h9", "s2-p3"]"#, r#"["h9", "s2-p3"], ["h1", "s1-p5", 4]"#);
        let t = load(&json).unwrap();
        assert_eq!(t.successors("h1").count(), 1);
        assert_eq!(t.edge_weight("h1", "s1"), Some(4.0));
    }

    #[test]
    fn short_link_is_malformed() {
        let json = NET.replace(r#"["h9", "s2-p3"]"#, r#"["h9"]"#);
        assert!(matches!(load(&json), Err(LoadError::MalformedLink { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dup_host = NET.replace(r#""h9": {"#, r#""h1": {"#);
        assert!(matches!(load(&dup_host), Err(LoadError::DuplicateId(id)) if id == "h1"));

        let cross_kind = NET.replace(r#""s2": {}"#, r#""h4": {}"#);
        assert!(matches!(load(&cross_kind), Err(LoadError::DuplicateId(id)) if id == "h4"));
    }

    #[test]
    fn unclassifiable_hosts_are_rejected() {
        let bad_addr = NET.replace("10.0.9.9/24", "not-an-ip");
        assert!(matches!(load(&bad_addr), Err(LoadError::UnknownEntityKind { .. })));

        let bad_role = NET.replace(
            r#""h9": {"ip": "10.0.9.9/24","#,
            r#""h9": {"ip": "10.0.9.9/24", "role": "router","#,
        );
        assert!(matches!(load(&bad_role), Err(LoadError::UnknownEntityKind { .. })));
    }

    #[test]
    fn explicit_role_overrides_address() {
        let json = NET.replace(
            r#""h9": {"ip": "10.0.9.9/24","#,
            r#""h9": {"ip": "10.0.9.9/24", "role": "pdc", "capacity": 5,"#,
        );
        let t = load(&json).unwrap();
        assert_eq!(t.collector("h9").unwrap().capacity, 5);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(load("{\"hosts\": ["), Err(LoadError::Parse(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(NET.as_bytes()).unwrap();
        let t = Topology::from_path(file.path(), &RoleRules::default()).unwrap();
        assert_eq!(t.sources().count(), 2);

        let missing = Topology::from_path("/nonexistent/topology.json", &RoleRules::default());
        assert!(matches!(missing, Err(LoadError::Io(_))));
    }
}
