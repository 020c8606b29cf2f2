//! Entity and bus identifiers.
//!
//! Node ids are opaque strings, unique across every entity kind in one
//! topology. Link endpoints in a topology description may name a switch port
//! (`s1-p2`); the port suffix is stripped before lookup.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a node (source, collector, fabric or host).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create an id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create an id from a link endpoint, dropping a trailing `-p<port>` suffix.
    ///
    /// ```
    /// use phasorgrid_topology::NodeId;
    ///
    /// assert_eq!(NodeId::from_endpoint("s1-p2").as_str(), "s1");
    /// assert_eq!(NodeId::from_endpoint("h1").as_str(), "h1");
    /// assert_eq!(NodeId::from_endpoint("pmu-east").as_str(), "pmu-east");
    /// ```
    pub fn from_endpoint(endpoint: &str) -> Self {
        let base = match endpoint.rsplit_once('-') {
            Some((base, port)) if is_port(port) && !base.is_empty() => base,
            _ => endpoint,
        };
        Self(base.to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_port(suffix: &str) -> bool {
    suffix
        .strip_prefix('p')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// An abstract measurement point observed by one or more sources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(String);

impl BusId {
    /// Create a bus id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BusId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BusId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn port_suffix_is_stripped() {
        assert_eq!(NodeId::from_endpoint("s3-p12"), "s3");
        assert_eq!(NodeId::from_endpoint("switch-a-p1"), "switch-a");
    }

    #[test]
    fn non_port_suffix_is_kept() {
        assert_eq!(NodeId::from_endpoint("s3-p"), "s3-p");
        assert_eq!(NodeId::from_endpoint("s3-px"), "s3-px");
        assert_eq!(NodeId::from_endpoint("-p1"), "-p1");
    }

    #[test]
    fn lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(NodeId::new("PDC1"), 7);
        assert_eq!(map.get("PDC1"), Some(&7));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&NodeId::new("PMU1")).unwrap();
        assert_eq!(json, "\"PMU1\"");
    }
}
