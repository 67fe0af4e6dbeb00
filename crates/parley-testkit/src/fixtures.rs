//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: two deterministic parties
//! (a candidate proposing a channel and a recruiter accepting it) plus
//! builders for every signed artifact the manager consumes.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;

use parley_core::{
    accept_bytes, close_bytes, keccak256, message_bytes, state_update_bytes,
    ChannelAcceptRequest, ChannelCloseRequest, ChannelId, ChannelOpenRequest, Keypair, Message,
    MessageKind, Participant, Role, Signature, StateUpdate,
};
use parley_store::MemoryStore;

/// A fixture holding both sides of a negotiation.
pub struct TestFixture {
    pub candidate: Keypair,
    pub recruiter: Keypair,
}

impl TestFixture {
    /// Fresh random parties.
    pub fn new() -> Self {
        Self {
            candidate: Keypair::generate(),
            recruiter: Keypair::generate(),
        }
    }

    /// A fresh empty in-memory store.
    pub fn store(&self) -> MemoryStore {
        MemoryStore::new()
    }

    /// Deterministic parties from seeds.
    pub fn with_seeds(candidate: [u8; 32], recruiter: [u8; 32]) -> Self {
        Self {
            candidate: Keypair::from_seed(&candidate).expect("valid seed"),
            recruiter: Keypair::from_seed(&recruiter).expect("valid seed"),
        }
    }

    /// The proposing participant (candidate side).
    pub fn candidate_participant(&self) -> Participant {
        participant(&self.candidate, Role::Candidate, "sam-the-candidate")
    }

    /// The accepting participant (recruiter side).
    pub fn recruiter_participant(&self) -> Participant {
        participant(&self.recruiter, Role::Recruiter, "acme-recruiting")
    }

    /// A channel-open request with empty initial data.
    pub fn open_request(&self, expiry_hours: Option<f64>) -> ChannelOpenRequest {
        self.open_request_with(Map::new(), expiry_hours)
    }

    /// A channel-open request with the given initial data.
    pub fn open_request_with(
        &self,
        initial_data: Map<String, Value>,
        expiry_hours: Option<f64>,
    ) -> ChannelOpenRequest {
        ChannelOpenRequest {
            participant_a: self.candidate_participant(),
            participant_b: self.recruiter_participant(),
            initial_data,
            expiry_hours,
        }
    }

    /// An accept request signed by the recruiter (the acceptor).
    pub fn accept_request(&self, channel_id: &ChannelId) -> ChannelAcceptRequest {
        ChannelAcceptRequest {
            channel_id: *channel_id,
            signature: sign_payload(&self.recruiter, &accept_bytes(channel_id)),
        }
    }

    /// An accept signature from the proposer, for negative tests.
    pub fn sign_accept_as_proposer(&self, channel_id: &ChannelId) -> Signature {
        sign_payload(&self.candidate, &accept_bytes(channel_id))
    }

    /// A state update for `nonce`, signed by the recruiter.
    pub fn signed_update(
        &self,
        channel_id: &ChannelId,
        nonce: u64,
        data: Map<String, Value>,
    ) -> StateUpdate {
        self.signed_update_by(&self.recruiter, channel_id, nonce, data)
    }

    /// A state update signed by an arbitrary keypair.
    pub fn signed_update_by(
        &self,
        signer: &Keypair,
        channel_id: &ChannelId,
        nonce: u64,
        data: Map<String, Value>,
    ) -> StateUpdate {
        let timestamp = Utc::now();
        let payload = state_update_bytes(channel_id, nonce, timestamp);
        StateUpdate {
            channel_id: *channel_id,
            nonce,
            data,
            timestamp,
            signatures: vec![sign_payload(signer, &payload)],
        }
    }

    /// A close request signed by the candidate (the proposer).
    pub fn close_request(&self, channel_id: &ChannelId, force: bool) -> ChannelCloseRequest {
        self.close_request_by(&self.candidate, channel_id, force)
    }

    /// A close request signed by an arbitrary keypair.
    pub fn close_request_by(
        &self,
        signer: &Keypair,
        channel_id: &ChannelId,
        force: bool,
    ) -> ChannelCloseRequest {
        let timestamp = Utc::now();
        ChannelCloseRequest {
            channel_id: *channel_id,
            signature: sign_payload(signer, &close_bytes(channel_id, timestamp)),
            timestamp,
            force,
        }
    }

    /// A signed message from the candidate to the recruiter.
    pub fn message(
        &self,
        channel_id: &ChannelId,
        kind: MessageKind,
        data: Map<String, Value>,
    ) -> Message {
        self.message_from(
            &self.candidate,
            self.recruiter.address(),
            channel_id,
            kind,
            data,
        )
    }

    /// A signed message from an arbitrary sender.
    pub fn message_from(
        &self,
        sender: &Keypair,
        to: parley_core::Address,
        channel_id: &ChannelId,
        kind: MessageKind,
        data: Map<String, Value>,
    ) -> Message {
        let id_bytes: [u8; 8] = rand::random();
        let mut message = Message {
            id: hex::encode(id_bytes),
            channel_id: *channel_id,
            kind,
            from: sender.address(),
            to,
            data,
            nonce: 1,
            timestamp: Utc::now(),
            signature: Signature {
                address: sender.address(),
                bytes: parley_core::SigBytes([0; 65]),
            },
        };
        message.signature = sign_payload(sender, &message_bytes(&message));
        message
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a participant from a keypair.
pub fn participant(keypair: &Keypair, role: Role, name: &str) -> Participant {
    Participant {
        address: keypair.address(),
        public_key: keypair.public_key(),
        role,
        name: name.to_string(),
        metadata: HashMap::new(),
    }
}

/// Sign a canonical payload: keccak256 then recoverable ECDSA.
pub fn sign_payload(keypair: &Keypair, payload: &[u8]) -> Signature {
    let digest = keccak256(payload);
    Signature {
        address: keypair.address(),
        bytes: keypair
            .sign_prehash(&digest)
            .expect("signing cannot fail for a valid key"),
    }
}
