//! The caller-facing error taxonomy for channel operations.

use thiserror::Error;

use parley_core::{ChannelId, ChannelState, ValidationError};
use parley_store::StoreError;

/// Errors surfaced by the channel manager, each with a stable tag.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Request schema or field-level violation. Never mutates state.
    #[error("validation failed: {0}")]
    Validation(ValidationError),

    /// Id-targeted lookup failed.
    #[error("channel not found: {0}")]
    NotFound(ChannelId),

    /// Operation not legal in the channel's current state.
    #[error("cannot {operation} a channel in state {state}")]
    State {
        state: ChannelState,
        operation: &'static str,
    },

    /// State-update nonce is not exactly `channel.nonce + 1`.
    #[error("invalid nonce: expected {expected}, got {got}")]
    Nonce { expected: u64, got: u64 },

    /// Signature malformed, signer not a participant, or recovery
    /// mismatch.
    #[error("signature rejected: {0}")]
    Signature(ValidationError),

    /// Operation arrived after the channel's TTL.
    #[error("channel has expired: {0}")]
    Expired(ChannelId),

    /// A resource limit was hit.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// Persistence-layer failure; the operation was fully aborted.
    #[error("store failure: {0}")]
    Store(StoreError),

    /// Invariant violation. A bug, not a caller error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChannelError {
    /// The stable wire tag for this error class.
    pub fn tag(&self) -> &'static str {
        match self {
            ChannelError::Validation(_) => "validation",
            ChannelError::NotFound(_) => "not_found",
            ChannelError::State { .. } => "state",
            ChannelError::Nonce { .. } => "nonce",
            ChannelError::Signature(_) => "signature",
            ChannelError::Expired(_) => "expired",
            ChannelError::Capacity(_) => "capacity",
            ChannelError::Store(_) => "store",
            ChannelError::Internal(_) => "internal",
        }
    }
}

impl From<ValidationError> for ChannelError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::NonceMismatch { expected, got } => {
                ChannelError::Nonce { expected, got }
            }
            ValidationError::PayloadTooLarge { size, limit } => ChannelError::Capacity(format!(
                "data payload is {} bytes, limit is {}",
                size, limit
            )),
            ValidationError::SignatureFailed
            | ValidationError::SignerMismatch { .. }
            | ValidationError::SignatureSenderMismatch
            | ValidationError::SignerNotParticipant(_)
            | ValidationError::NoSignatures
            | ValidationError::ProposerCannotAccept => ChannelError::Signature(e),
            other => ChannelError::Validation(other),
        }
    }
}

impl From<StoreError> for ChannelError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ChannelError::NotFound(id),
            other => ChannelError::Store(other),
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
