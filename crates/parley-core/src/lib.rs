//! # Parley Core
//!
//! Pure primitives for the parley state-channel coordinator: crypto, the
//! VRF toolkit, channel entities, canonical signing bytes and request
//! validation.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over signed data structures.
//!
//! ## Key Types
//!
//! - [`Channel`] - A bilateral negotiation session with a monotone nonce
//! - [`Message`] - An immutable signed message in a channel's log
//! - [`StateUpdate`] - A proposed, signed state transition
//! - [`Keypair`] / [`SigBytes`] - secp256k1 signing with recovery
//! - [`Validator`] - Enforces every channel invariant
//!
//! ## Canonical bytes
//!
//! All signatures cover deterministic byte strings; see [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod types;
pub mod validation;
pub mod vrf;

pub use canonical::{accept_bytes, close_bytes, message_bytes, state_update_bytes};
pub use crypto::{
    hash_block_header, hash_transaction, hmac_sha256, keccak256, recover, recover_prehash,
    Address, Keypair, PublicKey, Sha256Hash, SigBytes,
};
pub use error::{CryptoError, ValidationError, VrfError};
pub use types::{
    Channel, ChannelAcceptRequest, ChannelBackup, ChannelCloseRequest, ChannelEvent,
    ChannelFilter, ChannelId, ChannelInfoResponse, ChannelListResponse, ChannelOpenRequest,
    ChannelOpenResponse, ChannelState, ChannelStatistics, Message, MessageKind,
    NotificationData, Participant, Role, Signature, StateUpdate, StateUpdateResponse,
};
pub use validation::{Access, Validator};
pub use vrf::{
    combine_randomness, generate_vrf_key, is_leader, proposer_threshold, select_leader,
    validate_vrf_key, vrf_generate, vrf_verify, StakedValidator, VrfProof,
};
