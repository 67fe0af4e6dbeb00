//! Error types for the store module.

use thiserror::Error;

use parley_core::ChannelId;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Channel lookup failed.
    #[error("channel not found: {0}")]
    NotFound(ChannelId),

    /// No backup exists for the channel.
    #[error("backup not found: {0}")]
    BackupNotFound(ChannelId),

    /// Snapshot serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure in a substituted persistent backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
