//! Error types for phasorgrid-topology.

use thiserror::Error;

use crate::NodeId;

/// Errors that abort loading a topology. Nothing is partially loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A link is malformed or names an entity that does not exist.
    #[error("malformed link #{position}: {reason}")]
    MalformedLink { position: usize, reason: String },

    /// Two entities share an id.
    #[error("duplicate entity id `{0}`")]
    DuplicateId(NodeId),

    /// A host's role cannot be determined from its attributes.
    #[error("cannot classify host `{id}`: {reason}")]
    UnknownEntityKind { id: NodeId, reason: String },

    /// A source names a home that is not a collector.
    #[error("source `{source_id}` is homed to `{home}`, which is not a collector")]
    InvalidHome { source_id: NodeId, home: NodeId },

    /// The declared bindings overflow a collector.
    #[error("collector `{collector}` would carry {load} sources but has capacity {capacity}")]
    OverCapacity {
        collector: NodeId,
        load: u32,
        capacity: u32,
    },

    /// The document is not a valid topology description.
    #[error("invalid topology document: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document could not be read.
    #[error("cannot read topology: {0}")]
    Io(#[from] std::io::Error),
}

/// The requested collector does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no collector with id `{0}`")]
pub struct NotFound(pub NodeId);

/// Errors from edge mutations. The graph is left untouched on error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeError {
    /// An endpoint is not in the graph.
    #[error("edge endpoint `{0}` does not exist")]
    DanglingEndpoint(NodeId),

    /// A mesh link names something other than a fabric.
    #[error("`{0}` is not a fabric node")]
    NotAFabric(NodeId),

    /// A source already links to another node; sources are single-homed.
    #[error("source `{source_id}` is already attached to `{attached}`")]
    AlreadyAttached { source_id: NodeId, attached: NodeId },

    /// The edge to remove does not exist.
    #[error("no edge from `{from}` to `{to}`")]
    NoSuchEdge { from: NodeId, to: NodeId },

    /// The edge would reconnect more sources than the collector can carry.
    #[error("edge would push collector `{collector}` past its capacity of {capacity}")]
    WouldExceedCapacity { collector: NodeId, capacity: u32 },
}

/// Errors from committing a source binding. Nothing changes on error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("`{0}` is not a source")]
    UnknownSource(NodeId),

    #[error("`{0}` is not a collector")]
    UnknownCollector(NodeId),

    /// The source is not attached to the fabric named as the path's first hop.
    #[error("source `{source_id}` is not attached to fabric `{fabric}`")]
    NotAttached { source_id: NodeId, fabric: NodeId },

    /// The commit would push a collector past its capacity.
    #[error("collector `{collector}` is full ({load}/{capacity})")]
    CapacityViolation {
        collector: NodeId,
        load: u32,
        capacity: u32,
    },
}

/// Errors from inserting a node into a loaded topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
    #[error("entity id `{0}` is already in use")]
    DuplicateId(NodeId),

    #[error("`{0}` is not a fabric node")]
    NotAFabric(NodeId),

    /// The inserted node would reconnect more sources than fit.
    #[error("collector `{collector}` would exceed its capacity of {capacity}")]
    WouldExceedCapacity { collector: NodeId, capacity: u32 },
}
