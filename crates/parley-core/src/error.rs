//! Error types for the parley core.

use thiserror::Error;

use crate::crypto::Address;

/// Low-level cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    KeyLength { expected: usize, got: usize },

    #[error("invalid secret key scalar")]
    InvalidSecretKey,

    #[error("invalid signature length: expected 65, got {0}")]
    SignatureLength(usize),

    #[error("invalid public key: point is not on the curve")]
    InvalidPublicKey,

    #[error("malformed signature")]
    InvalidSignature,

    #[error("invalid recovery id: {0}")]
    RecoveryId(u8),

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("signing failed")]
    SigningFailed,

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Errors from the VRF construction and leader election.
#[derive(Debug, Error)]
pub enum VrfError {
    #[error("no active validators")]
    NoValidators,

    #[error("total stake must be positive")]
    InvalidStake,

    #[error("invalid VRF key length: expected 32, got {0}")]
    KeyLength(usize),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Validation errors for channel requests, messages and state updates.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("participant address does not match public key")]
    AddressMismatch,

    #[error("public key is not a valid curve point")]
    InvalidPublicKey,

    #[error("participants cannot share an address")]
    DuplicateParticipant,

    #[error("participants must have different roles")]
    DuplicateRole,

    #[error("invalid expiry hours: {0}")]
    InvalidExpiry(f64),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("{kind} message must include {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("sender and recipient cannot be the same")]
    SelfAddressed,

    #[error("timestamp is too far in the future")]
    TimestampInFuture,

    #[error("timestamp is too old")]
    TimestampTooOld,

    #[error("data payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("data payload nesting exceeds {0} levels")]
    PayloadTooDeep(usize),

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("recovered signer {recovered} does not match claimed {claimed}")]
    SignerMismatch {
        claimed: Address,
        recovered: Address,
    },

    #[error("signature address does not match the message sender")]
    SignatureSenderMismatch,

    #[error("signer {0} is not a channel participant")]
    SignerNotParticipant(Address),

    #[error("{0} is not a channel participant")]
    NotParticipant(Address),

    #[error("invalid nonce: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },

    #[error("update timestamp predates the channel's last update")]
    StaleUpdate,

    #[error("state update must carry at least one signature")]
    NoSignatures,

    #[error("channel id mismatch")]
    ChannelMismatch,

    #[error("the proposer cannot accept their own channel")]
    ProposerCannotAccept,

    #[error("channel is not open for writing")]
    NotWritable,
}

impl From<CryptoError> for ValidationError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPublicKey => ValidationError::InvalidPublicKey,
            _ => ValidationError::SignatureFailed,
        }
    }
}
