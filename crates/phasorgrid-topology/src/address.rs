//! Host addressing and role classification.
//!
//! Hosts in a topology description carry no explicit type. Their role is
//! derived from the address range they sit in: one subnet for measurement
//! sources, one for collectors, anything else is a generic host.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parse a host address.
///
/// Accepts dotted quads with an optional prefix length (`10.0.1.1/24`) and
/// hexadecimal integers (`0x0a000101`).
pub fn parse_address(raw: &str) -> Option<Ipv4Addr> {
    let raw = raw.trim();
    let bare = raw.split_once('/').map_or(raw, |(addr, _)| addr);
    if let Some(hex) = bare.strip_prefix("0x").or_else(|| bare.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok().map(Ipv4Addr::from);
    }
    bare.parse().ok()
}

/// An IPv4 network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Create a subnet. Returns `None` for prefixes longer than 32 bits.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Option<Self> {
        (prefix <= 32).then_some(Self { network, prefix })
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    /// Whether `addr` falls inside this network.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(addr) & mask == u32::from(self.network) & mask
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Error parsing a [`Subnet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid subnet `{0}`, expected a.b.c.d/len")]
pub struct SubnetParseError(pub String);

impl FromStr for Subnet {
    type Err = SubnetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SubnetParseError(s.to_string());
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(err)?;
        let network: Ipv4Addr = addr.parse().map_err(|_| err())?;
        let prefix: u8 = prefix.parse().map_err(|_| err())?;
        Self::new(network, prefix).ok_or_else(err)
    }
}

/// Role a host plays in the measurement network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    /// Phasor measurement unit.
    Source,
    /// Phasor data concentrator.
    Collector,
    /// Any other endpoint.
    Host,
}

impl FromStr for HostRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" | "pmu" => Ok(Self::Source),
            "collector" | "pdc" => Ok(Self::Collector),
            "host" => Ok(Self::Host),
            other => Err(format!("unknown role `{other}`")),
        }
    }
}

/// Address ranges used to classify hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRules {
    /// Network holding measurement sources.
    pub sources: Subnet,
    /// Network holding collectors.
    pub collectors: Subnet,
}

impl Default for RoleRules {
    fn default() -> Self {
        Self {
            sources: Subnet { network: Ipv4Addr::new(10, 0, 1, 0), prefix: 24 },
            collectors: Subnet { network: Ipv4Addr::new(10, 0, 2, 0), prefix: 24 },
        }
    }
}

impl RoleRules {
    /// Classify an address. Sources win if the two ranges overlap.
    pub fn classify(&self, addr: Ipv4Addr) -> HostRole {
        if self.sources.contains(addr) {
            HostRole::Source
        } else if self.collectors.contains(addr) {
            HostRole::Collector
        } else {
            HostRole::Host
        }
    }
}
