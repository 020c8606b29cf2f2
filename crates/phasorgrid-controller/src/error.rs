//! Error types for the controller.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the controller.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Topology could not be loaded
    #[error("Topology error: {0}")]
    Load(#[from] phasorgrid_topology::LoadError),

    /// A restored collector could not be inserted
    #[error("Restore rejected: {0}")]
    Restore(#[from] phasorgrid_topology::InsertError),

    /// IO error while writing to a sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while writing to a sink
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The controller task is gone
    #[error("Controller channel closed")]
    ChannelClosed,
}
