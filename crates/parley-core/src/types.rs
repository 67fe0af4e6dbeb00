//! Channel entities and wire-facing request/response types.
//!
//! A channel is a private bilateral session between a candidate and a
//! recruiter. All state that crosses a trust boundary is signed; the
//! entities here are the things those signatures cover.

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use crate::crypto::{Address, PublicKey, SigBytes};
use crate::error::CryptoError;

/// Unique channel identifier: 128 random bits, hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub [u8; 16]);

impl ChannelId {
    /// Allocate a fresh random id.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes.try_into().map_err(|_| CryptoError::KeyLength {
            expected: 16,
            got: s.len() / 2,
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// The two sides of a hiring negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Candidate,
    Recruiter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::Recruiter => "recruiter",
        }
    }
}

/// A channel participant. Immutable once the channel is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Account address, bound to the public key.
    pub address: Address,

    /// Uncompressed secp256k1 public key.
    pub public_key: PublicKey,

    /// Which side of the negotiation this party is.
    pub role: Role,

    /// Display name.
    pub name: String,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// Created by the proposer, waiting for the counterparty's acceptance.
    Opening,
    /// Both parties signed on; messages and updates flow.
    Open,
    /// Cooperative close initiated, waiting for the counter-signature.
    Closing,
    /// Terminal. A closed channel never reopens.
    Closed,
    /// A dispute message was raised; mutation is frozen.
    Disputed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Opening => "opening",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
            ChannelState::Disputed => "disputed",
        }
    }

    /// Can messages and state updates be admitted?
    pub fn is_writable(&self) -> bool {
        matches!(self, ChannelState::Open)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bilateral state channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,

    /// Ordered pair: `[proposer, acceptor]`.
    pub participants: [Participant; 2],

    pub state: ChannelState,

    /// Monotone non-decreasing state-update counter.
    pub nonce: u64,

    /// Optional balance ledger keyed by address.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub balance: HashMap<Address, BigUint>,

    /// Accumulated negotiation state (last-writer-wins per key).
    #[serde(default)]
    pub data: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Settlement transaction reference, once one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_tx: Option<String>,

    /// Who moved the channel into Closing; the other party counter-signs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_initiator: Option<Address>,
}

impl Channel {
    /// The party that created the channel.
    pub fn proposer(&self) -> &Participant {
        &self.participants[0]
    }

    /// The party expected to accept it.
    pub fn acceptor(&self) -> &Participant {
        &self.participants[1]
    }

    /// Look up a participant by address.
    pub fn participant(&self, address: &Address) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.address == address)
    }

    /// Is the address one of the two parties?
    pub fn is_participant(&self, address: &Address) -> bool {
        self.participant(address).is_some()
    }

    /// The counterparty of the given address, if the address is a party.
    pub fn counterparty(&self, address: &Address) -> Option<&Participant> {
        if !self.is_participant(address) {
            return None;
        }
        self.participants.iter().find(|p| &p.address != address)
    }

    /// Has the channel's TTL elapsed?
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A proposed state transition. Ephemeral: merged into the channel on
/// acceptance, never stored as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdate {
    pub channel_id: ChannelId,

    /// Must be exactly `channel.nonce + 1` at acceptance time.
    pub nonce: u64,

    /// Patch merged into `channel.data` (last-writer-wins).
    pub data: Map<String, Value>,

    pub timestamp: DateTime<Utc>,

    /// One or two participant signatures over the canonical update bytes.
    pub signatures: Vec<Signature>,
}

/// The closed set of message types a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ChannelOpen,
    ChannelAccept,
    StateUpdate,
    ChannelClose,
    Dispute,
    ResumeRequest,
    JobApplication,
    InterviewInvite,
    OfferLetter,
    ContractSign,
}

impl MessageKind {
    /// All kinds, in tag order.
    pub const ALL: [MessageKind; 10] = [
        MessageKind::ChannelOpen,
        MessageKind::ChannelAccept,
        MessageKind::StateUpdate,
        MessageKind::ChannelClose,
        MessageKind::Dispute,
        MessageKind::ResumeRequest,
        MessageKind::JobApplication,
        MessageKind::InterviewInvite,
        MessageKind::OfferLetter,
        MessageKind::ContractSign,
    ];

    /// The case-sensitive wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ChannelOpen => "channel_open",
            MessageKind::ChannelAccept => "channel_accept",
            MessageKind::StateUpdate => "state_update",
            MessageKind::ChannelClose => "channel_close",
            MessageKind::Dispute => "dispute",
            MessageKind::ResumeRequest => "resume_request",
            MessageKind::JobApplication => "job_application",
            MessageKind::InterviewInvite => "interview_invite",
            MessageKind::OfferLetter => "offer_letter",
            MessageKind::ContractSign => "contract_sign",
        }
    }

    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claimed signer plus the raw 65-byte signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// The address the signer claims; checked against recovery.
    pub address: Address,

    /// `r || s || v`, hex on the wire.
    #[serde(rename = "signature")]
    pub bytes: SigBytes,
}

/// An immutable message appended to a channel's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque unique id.
    pub id: String,

    pub channel_id: ChannelId,

    #[serde(rename = "type")]
    pub kind: MessageKind,

    pub from: Address,
    pub to: Address,

    /// Bounded payload.
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Per-channel message counter.
    pub nonce: u64,

    pub timestamp: DateTime<Utc>,

    pub signature: Signature,
}

/// An append-only channel event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub id: String,
    pub channel_id: ChannelId,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,

    pub timestamp: DateTime<Utc>,
}

impl ChannelEvent {
    /// Build an event with a fresh random id.
    pub fn new(channel_id: ChannelId, kind: &str, data: Value, timestamp: DateTime<Utc>) -> Self {
        let id_bytes: [u8; 8] = rand::random();
        Self {
            id: hex::encode(id_bytes),
            channel_id,
            kind: kind.to_string(),
            data,
            timestamp,
        }
    }
}

/// A full channel snapshot for recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBackup {
    pub channel: Channel,
    pub messages: Vec<Message>,
    pub events: Vec<ChannelEvent>,
    pub backup_at: DateTime<Utc>,
}

/// Filter for channel listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ChannelState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: usize,
}

impl ChannelFilter {
    /// Does a channel match every set criterion?
    pub fn matches(&self, channel: &Channel) -> bool {
        if let Some(state) = self.state {
            if channel.state != state {
                return false;
            }
        }
        if let Some(participant) = &self.participant {
            if !channel.is_participant(participant) {
                return false;
            }
        }
        if let Some(role) = self.role {
            if !channel.participants.iter().any(|p| p.role == role) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if channel.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if channel.created_at > before {
                return false;
            }
        }
        true
    }
}

/// Aggregate counters over all channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelStatistics {
    pub total_channels: u64,
    pub active_channels: u64,
    pub closed_channels: u64,
    pub channels_by_state: HashMap<ChannelState, u64>,
    pub messages_by_type: HashMap<MessageKind, u64>,
    pub participants_by_role: HashMap<Role, u64>,

    /// Mean lifetime of closed channels, in hours.
    pub average_lifetime_hours: f64,
}

// ─────────────────────────────────────────────────────────────────────────
// Request / response types (transport-neutral)
// ─────────────────────────────────────────────────────────────────────────

/// Request to open a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOpenRequest {
    pub participant_a: Participant,
    pub participant_b: Participant,

    #[serde(default)]
    pub initial_data: Map<String, Value>,

    /// TTL in hours; fractional values allowed, absent means the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOpenResponse {
    pub channel_id: ChannelId,
    pub state: ChannelState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Channel> for ChannelOpenResponse {
    fn from(channel: &Channel) -> Self {
        Self {
            channel_id: channel.id,
            state: channel.state,
            created_at: channel.created_at,
            expires_at: channel.expires_at,
        }
    }
}

/// Request to accept a channel in Opening state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAcceptRequest {
    pub channel_id: ChannelId,
    pub signature: Signature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdateResponse {
    pub channel_id: ChannelId,
    pub nonce: u64,
    pub updated_at: DateTime<Utc>,
    pub success: bool,
}

/// Request to close a channel, cooperatively or by force.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCloseRequest {
    pub channel_id: ChannelId,

    pub signature: Signature,

    /// The timestamp the signer folded into the close payload.
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfoResponse {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelListResponse {
    pub channels: Vec<Channel>,
    pub total: usize,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// A user-targeted notification for the realtime hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,

    pub timestamp: DateTime<Utc>,
}
