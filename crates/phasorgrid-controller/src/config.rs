//! Controller configuration.

use std::path::PathBuf;

use phasorgrid_topology::{RoleRules, Subnet};
use thiserror::Error;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {var}: `{value}` ({reason})")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Topology description to load at startup.
    pub topology_path: PathBuf,
    /// Where to append `source, removed, new` route lines, if anywhere.
    pub route_log: Option<PathBuf>,
    /// Address ranges that classify hosts.
    pub role_rules: RoleRules,
    /// Capacity of the fault queue.
    pub queue_depth: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            topology_path: PathBuf::from("topology.json"),
            route_log: None,
            role_rules: RoleRules::default(),
            queue_depth: 64,
        }
    }
}

impl ControllerConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let topology_path = lookup("PHASORGRID_TOPOLOGY")
            .map(PathBuf::from)
            .unwrap_or(defaults.topology_path);

        let route_log = lookup("PHASORGRID_ROUTE_LOG")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let sources = subnet(&lookup, "PHASORGRID_SOURCE_NET", defaults.role_rules.sources)?;
        let collectors = subnet(&lookup, "PHASORGRID_COLLECTOR_NET", defaults.role_rules.collectors)?;

        let queue_depth = match lookup("PHASORGRID_QUEUE_DEPTH") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => return Err(invalid("PHASORGRID_QUEUE_DEPTH", raw, "must be positive")),
                Ok(depth) => depth,
                Err(e) => return Err(invalid("PHASORGRID_QUEUE_DEPTH", raw, e)),
            },
            None => defaults.queue_depth,
        };

        Ok(Self {
            topology_path,
            route_log,
            role_rules: RoleRules { sources, collectors },
            queue_depth,
        })
    }
}

fn subnet(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Subnet,
) -> Result<Subnet, ConfigError> {
    match lookup(var) {
        Some(raw) => raw.parse().map_err(|e| invalid(var, raw, e)),
        None => Ok(default),
    }
}

fn invalid(var: &'static str, value: String, reason: impl ToString) -> ConfigError {
    ConfigError {
        var,
        value,
        reason: reason.to_string(),
    }
}
