//! Error types for the neighbor cache subsystem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NeighborError {
    #[error("neighbor updater has shut down")]
    ShutDown,
}

/// Result type alias for neighbor cache operations.
pub type Result<T> = std::result::Result<T, NeighborError>;
