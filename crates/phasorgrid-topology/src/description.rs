//! Declarative topology descriptions.
//!
//! The document format follows the emulator topology files the network is
//! normally described with:
//!
//! ```json
//! {
//!   "hosts":    { "h1": { "ip": "10.0.1.1/24", "dir_busses": ["Bus1"] },
//!                 "h2": { "ip": "10.0.2.2/24", "capacity": 2 } },
//!   "switches": { "s1": { "Icapacity": 3, "Ocapacity": 6 } },
//!   "links":    [ ["h1", "s1-p1"], ["s1-p2", "h2", 2] ]
//! }
//! ```
//!
//! Entity maps are read in document order and duplicate keys are kept, so the
//! loader can reject them instead of silently taking the last one.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::NodeId;

/// A full topology description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyDescription {
    #[serde(default, deserialize_with = "ordered_entries")]
    pub hosts: Vec<(String, HostSpec)>,
    #[serde(default, deserialize_with = "ordered_entries")]
    pub switches: Vec<(String, SwitchSpec)>,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// Attributes of a host entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostSpec {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub mac: Option<String>,
    /// Explicit role; overrides address classification.
    #[serde(default)]
    pub role: Option<String>,
    /// Collector capacity.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Home collector of a source.
    #[serde(default, alias = "pdc", alias = "pdc_id")]
    pub home: Option<String>,
    #[serde(default, alias = "dir_busses")]
    pub direct_buses: Vec<String>,
    #[serde(default, alias = "adj_busses")]
    pub adjacent_buses: Vec<String>,
}

/// Attributes of a switch entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwitchSpec {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, alias = "Icapacity")]
    pub ingress_capacity: Option<u32>,
    #[serde(default, alias = "Ocapacity")]
    pub egress_capacity: Option<u32>,
}

/// A link entry: `[a, b]`, `[a, b, weight]` or `{source, target, weight}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LinkSpec {
    Named {
        source: String,
        target: String,
        #[serde(default, alias = "traffic")]
        weight: Option<f64>,
    },
    Tuple(Vec<Value>),
}

/// Weight given to links that do not declare one.
pub const DEFAULT_LINK_WEIGHT: f64 = 1.0;

impl LinkSpec {
    /// Resolve to base endpoint ids and a weight.
    ///
    /// Port suffixes are stripped. A non-numeric third tuple element (latency
    /// or bandwidth annotations) is ignored.
    pub fn resolve(&self) -> Result<(NodeId, NodeId, f64), String> {
        let (a, b, weight) = match self {
            LinkSpec::Named { source, target, weight } => {
                (source.as_str(), target.as_str(), weight.unwrap_or(DEFAULT_LINK_WEIGHT))
            }
            LinkSpec::Tuple(items) => {
                let endpoint = |i: usize| {
                    items
                        .get(i)
                        .and_then(Value::as_str)
                        .ok_or_else(|| format!("expected two endpoint names, got {}", Value::Array(items.clone())))
                };
                let weight = items.get(2).and_then(Value::as_f64).unwrap_or(DEFAULT_LINK_WEIGHT);
                (endpoint(0)?, endpoint(1)?, weight)
            }
        };
        if !weight.is_finite() || weight < 0.0 {
            return Err(format!("invalid weight {weight}"));
        }
        let (a, b) = (NodeId::from_endpoint(a), NodeId::from_endpoint(b));
        if a == b {
            return Err(format!("link from `{a}` to itself"));
        }
        Ok((a, b, weight))
    }
}

fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct EntriesVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of entity ids to attributes")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, V>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}
