//! Error types for the grid node and the probe.

use thiserror::Error;

/// Errors raised while starting or using a [`GridNode`](crate::grid::GridNode).
#[derive(Debug, Error)]
pub enum GridError {
    /// A configuration value is out of range.
    #[error("invalid grid configuration: {0}")]
    InvalidConfig(&'static str),

    /// One of the node's worker threads could not be spawned.
    #[error("failed to spawn grid thread '{name}': {source}")]
    Spawn {
        /// Name of the thread that failed to start.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A map with this name exists but holds other key or value types.
    #[error("map '{0}' already exists with different key or value types")]
    MapTypeMismatch(String),

    /// The node has been shut down and no longer hands out maps.
    #[error("grid node has been shut down")]
    Shutdown,
}

/// Errors that abort the probe at startup.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The grid node could not be started or the timer map obtained.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// The reporter thread could not be spawned.
    #[error("failed to start reporter: {0}")]
    Reporter(#[source] std::io::Error),
}
