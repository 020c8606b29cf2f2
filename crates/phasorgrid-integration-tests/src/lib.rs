//! Shared fixtures for PhasorGrid scenario tests.

use phasorgrid_topology::{RoleRules, Topology};

/// Three sources on one switch. Collectors A and B hold two each; sources 1
/// and 2 report to A, source 3 to B.
///
/// B already carries S3, so once A is gone only one of S1 and S2 fits on it:
/// S1 moves to B and S2 is reported failed.
pub const SCENARIO_A: &str = r#"{
    "hosts": {
        "S1": {"ip": "10.0.1.1/24", "pdc": "A", "dir_busses": ["Bus1"]},
        "S2": {"ip": "10.0.1.2/24", "pdc": "A", "dir_busses": ["Bus2"]},
        "S3": {"ip": "10.0.1.3/24", "pdc": "B", "dir_busses": ["Bus3"]},
        "A":  {"ip": "10.0.2.1/24", "capacity": 2},
        "B":  {"ip": "10.0.2.2/24", "capacity": 2}
    },
    "switches": {"s1": {}},
    "links": [
        ["S1", "s1-p1"], ["S2", "s1-p2"], ["S3", "s1-p3"],
        ["s1-p4", "A"], ["s1-p5", "B"]
    ]
}"#;

/// Eight PMUs, five PDCs and three switches in a line.
///
/// Addresses share one subnet, so every host carries an explicit role.
/// PMU4 and PMU7 name homes behind a different switch and start disconnected.
pub const SAMPLE_NETWORK: &str = r#"{
    "hosts": {
        "PMU1": {"ip": "0x0a000001", "role": "pmu", "pdc": "PDC1", "dir_busses": ["Bus1", "Bus3"], "adj_busses": ["Bus2"]},
        "PMU2": {"ip": "0x0a000002", "role": "pmu", "pdc": "PDC1", "dir_busses": ["Bus4", "Bus6"], "adj_busses": ["Bus5"]},
        "PMU3": {"ip": "0x0a000003", "role": "pmu", "pdc": "PDC2", "dir_busses": ["Bus7", "Bus9"], "adj_busses": ["Bus8"]},
        "PMU4": {"ip": "0x0a000004", "role": "pmu", "pdc": "PDC2", "dir_busses": ["Bus9", "Bus11"], "adj_busses": ["Bus10"]},
        "PMU5": {"ip": "0x0a000005", "role": "pmu", "pdc": "PDC3", "dir_busses": ["Bus11", "Bus13"], "adj_busses": ["Bus12"]},
        "PMU6": {"ip": "0x0a000006", "role": "pmu", "pdc": "PDC3", "dir_busses": ["Bus13", "Bus15"], "adj_busses": ["Bus14"]},
        "PMU7": {"ip": "0x0a000007", "role": "pmu", "pdc": "PDC4", "dir_busses": ["Bus15", "Bus17"], "adj_busses": ["Bus16"]},
        "PMU8": {"ip": "0x0a000008", "role": "pmu", "pdc": "PDC5", "dir_busses": ["Bus17"], "adj_busses": ["Bus18"]},
        "PDC1": {"ip": "0x0a000009", "role": "pdc", "capacity": 3},
        "PDC2": {"ip": "0x0a00000a", "role": "pdc", "capacity": 3},
        "PDC3": {"ip": "0x0a00000b", "role": "pdc", "capacity": 2},
        "PDC4": {"ip": "0x0a00000c", "role": "pdc", "capacity": 2},
        "PDC5": {"ip": "0x0a00000d", "role": "pdc", "capacity": 2}
    },
    "switches": {
        "Switch1": {"ip": "0x0a00000e", "Icapacity": 3, "Ocapacity": 6},
        "Switch2": {"ip": "0x0a00000f", "Icapacity": 3, "Ocapacity": 6},
        "Switch3": {"ip": "0x0a000010", "Icapacity": 3, "Ocapacity": 6}
    },
    "links": [
        {"source": "PMU1", "target": "Switch1", "traffic": 1},
        {"source": "PMU2", "target": "Switch1", "traffic": 1},
        {"source": "PMU3", "target": "Switch1", "traffic": 1},
        {"source": "PMU4", "target": "Switch2", "traffic": 1},
        {"source": "PMU5", "target": "Switch2", "traffic": 1},
        {"source": "PMU6", "target": "Switch2", "traffic": 1},
        {"source": "PMU7", "target": "Switch3", "traffic": 1},
        {"source": "PMU8", "target": "Switch3", "traffic": 1},
        {"source": "Switch1", "target": "PDC1", "traffic": 2},
        {"source": "Switch1", "target": "PDC2", "traffic": 2},
        {"source": "Switch2", "target": "PDC3", "traffic": 2},
        {"source": "Switch2", "target": "PDC4", "traffic": 2},
        {"source": "Switch3", "target": "PDC5", "traffic": 2},
        {"source": "Switch1", "target": "Switch2", "traffic": 3},
        {"source": "Switch2", "target": "Switch3", "traffic": 3}
    ]
}"#;

pub fn scenario_a() -> Topology {
    load(SCENARIO_A)
}

pub fn sample_network() -> Topology {
    load(SAMPLE_NETWORK)
}

fn load(json: &str) -> Topology {
    match Topology::from_json(json, &RoleRules::default()) {
        Ok(topo) => topo,
        Err(e) => panic!("fixture failed to load: {e}"),
    }
}

/// Panic unless every collector is within capacity and its load matches the
/// sources that actually reach it.
pub fn assert_capacity_invariant(topo: &Topology) {
    for c in topo.collectors() {
        assert!(
            c.current_load <= c.capacity,
            "{} carries {} but holds {}",
            c.id,
            c.current_load,
            c.capacity
        );
        let bound = topo.bound_sources(c.id.as_str()).len();
        assert_eq!(bound, c.current_load as usize, "derived load mismatch on {}", c.id);
    }
}

/// Number of sources that reach their home collector.
pub fn connected_sources(topo: &Topology) -> usize {
    topo.sources()
        .filter(|s| topo.is_connected(s.id.as_str()))
        .count()
}
