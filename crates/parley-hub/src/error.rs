//! Error types for the realtime hub.

use thiserror::Error;

use crate::session::SessionId;

/// Errors surfaced by hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub stopped accepting new sessions.
    #[error("hub is shutting down")]
    ShuttingDown,

    /// The session id does not correspond to a live session.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    /// An inbound frame exceeded the size bound; the session was closed.
    #[error("inbound frame of {size} bytes exceeds the {limit}-byte limit")]
    FrameTooLarge { size: usize, limit: usize },
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
