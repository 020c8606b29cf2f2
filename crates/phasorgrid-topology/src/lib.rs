//! PhasorGrid Topology
//!
//! Directed-graph model of a phasor measurement network.
//!
//! # Entities
//!
//! - **Sources** (PMUs) measure buses and stream to one home collector.
//! - **Collectors** (PDCs) accept a bounded number of sources.
//! - **Fabrics** (switches) forward traffic and mesh with each other.
//!
//! Committed data paths are always `source -> fabric -> collector`. Mesh
//! edges between fabrics only serve neighbor discovery when a source has to
//! be re-homed.
//!
//! # Invariants
//!
//! After every mutation, each collector's `current_load` equals the number of
//! sources homed to it that still have a path to it, and never exceeds its
//! capacity. Node ids are unique across all entity kinds.

mod address;
mod description;
mod entity;
mod error;
mod id;
mod load;
mod snapshot;
mod store;

pub use address::{parse_address, HostRole, RoleRules, Subnet, SubnetParseError};
pub use description::{HostSpec, LinkSpec, SwitchSpec, TopologyDescription, DEFAULT_LINK_WEIGHT};
pub use entity::{Collector, Fabric, Host, Node, NodeKind, Source};
pub use error::{BindError, EdgeError, InsertError, LoadError, NotFound};
pub use id::{BusId, NodeId};
pub use load::DEFAULT_COLLECTOR_CAPACITY;
pub use snapshot::TopologySnapshot;
pub use store::{Edge, StoreId, Topology};

/// Result type for loading topologies.
pub type Result<T> = std::result::Result<T, LoadError>;
