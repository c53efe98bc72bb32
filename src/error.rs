//! Engine error types
//!
//! Only construction can fail. Steady-state I/O errors end the affected
//! operation and are recorded on its slot instead of being propagated.

use std::io;
use thiserror::Error;

/// Errors returned while building and starting the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bind address could not be parsed
    #[error("invalid bind address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Capacity must be at least one connection
    #[error("invalid capacity {0}: must be > 0")]
    InvalidCapacity(usize),

    /// Segment size must be non-zero and the arena must fit in memory
    #[error("invalid buffer size {buffer_size} for capacity {capacity}")]
    InvalidBufferSize { buffer_size: usize, capacity: usize },

    /// No session factory was supplied to the builder
    #[error("a session factory is required")]
    MissingFactory,

    /// Listening socket could not be created or bound
    #[error("failed to bind listener on {address}: {source}")]
    Bind {
        address: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
