//! Request validation: participant well-formedness, signature
//! authenticity, message schema, state-update rules and access control.
//!
//! The validator is stateless apart from a small set of trusted admin
//! keys, so one instance can be shared freely across threads.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::canonical;
use crate::crypto::{keccak256, recover_prehash, Address, PublicKey};
use crate::error::ValidationError;
use crate::types::{
    Channel, ChannelOpenRequest, Message, MessageKind, Participant, Signature, StateUpdate,
};

/// Default per-channel data payload bound (1 MiB).
pub const DEFAULT_MAX_DATA_BYTES: usize = 1_048_576;

/// Default burst-detection threshold: messages per sender per window.
pub const DEFAULT_BURST_THRESHOLD: usize = 100;

/// Longest admissible channel TTL in hours (one year).
pub const MAX_EXPIRY_HOURS: f64 = 8760.0;

/// What a caller wants to do with a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Close,
}

/// The channel validator.
pub struct Validator {
    max_data_bytes: usize,
    burst_threshold: usize,
    trusted_keys: HashMap<Address, PublicKey>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DATA_BYTES, DEFAULT_BURST_THRESHOLD)
    }
}

impl Validator {
    pub fn new(max_data_bytes: usize, burst_threshold: usize) -> Self {
        Self {
            max_data_bytes,
            burst_threshold,
            trusted_keys: HashMap::new(),
        }
    }

    /// Register a trusted key for out-of-band admin actions.
    pub fn add_trusted_key(&mut self, address: Address, key: PublicKey) {
        self.trusted_keys.insert(address, key);
    }

    /// Is the address one of the trusted admin identities?
    pub fn is_trusted(&self, address: &Address) -> bool {
        self.trusted_keys.contains_key(address)
    }

    /// Validate a single participant.
    ///
    /// Checks: non-empty fields, the public key parses to a curve point,
    /// and the address is the keccak-derived address of that key.
    pub fn validate_participant(&self, participant: &Participant) -> Result<(), ValidationError> {
        if participant.address == Address::ZERO {
            return Err(ValidationError::EmptyField("participant address"));
        }
        if participant.name.is_empty() {
            return Err(ValidationError::EmptyField("participant name"));
        }
        participant.public_key.verifying_key()?;
        if participant.public_key.address() != participant.address {
            return Err(ValidationError::AddressMismatch);
        }
        Ok(())
    }

    /// Validate a channel creation request.
    pub fn validate_channel_creation(
        &self,
        request: &ChannelOpenRequest,
    ) -> Result<(), ValidationError> {
        self.validate_participant(&request.participant_a)?;
        self.validate_participant(&request.participant_b)?;

        if request.participant_a.address == request.participant_b.address {
            return Err(ValidationError::DuplicateParticipant);
        }
        if request.participant_a.role == request.participant_b.role {
            return Err(ValidationError::DuplicateRole);
        }
        if let Some(hours) = request.expiry_hours {
            if !hours.is_finite() || hours <= 0.0 || hours > MAX_EXPIRY_HOURS {
                return Err(ValidationError::InvalidExpiry(hours));
            }
        }
        canonical::check_data_bounds(&request.initial_data, self.max_data_bytes)?;
        Ok(())
    }

    /// Verify a signature over a canonical payload.
    ///
    /// The payload is hashed with keccak256, the signer's key recovered,
    /// and the derived address compared against the claimed one.
    pub fn validate_signature(
        &self,
        payload: &[u8],
        signature: &Signature,
    ) -> Result<(), ValidationError> {
        if signature.address == Address::ZERO {
            return Err(ValidationError::EmptyField("signature address"));
        }

        let digest = keccak256(payload);
        let recovered = recover_prehash(&digest, &signature.bytes)?;
        let recovered_address = recovered.address();
        if recovered_address != signature.address {
            return Err(ValidationError::SignerMismatch {
                claimed: signature.address,
                recovered: recovered_address,
            });
        }
        Ok(())
    }

    /// Verify a signature and require the signer to be a channel
    /// participant.
    pub fn validate_participant_signature(
        &self,
        payload: &[u8],
        signature: &Signature,
        channel: &Channel,
    ) -> Result<(), ValidationError> {
        if !channel.is_participant(&signature.address) {
            return Err(ValidationError::SignerNotParticipant(signature.address));
        }
        self.validate_signature(payload, signature)
    }

    /// Validate a message against its channel.
    pub fn validate_message(
        &self,
        message: &Message,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if message.id.is_empty() {
            return Err(ValidationError::EmptyField("message id"));
        }
        if message.channel_id != channel.id {
            return Err(ValidationError::ChannelMismatch);
        }
        if message.from == message.to {
            return Err(ValidationError::SelfAddressed);
        }
        if !channel.is_participant(&message.from) {
            return Err(ValidationError::NotParticipant(message.from));
        }
        if !channel.is_participant(&message.to) {
            return Err(ValidationError::NotParticipant(message.to));
        }

        self.validate_timestamp(message.timestamp, now)?;
        canonical::check_data_bounds(&message.data, self.max_data_bytes)?;
        self.validate_message_schema(message)?;

        if message.signature.address != message.from {
            return Err(ValidationError::SignatureSenderMismatch);
        }
        self.validate_participant_signature(
            &canonical::message_bytes(message),
            &message.signature,
            channel,
        )
    }

    /// Schema-level checks per message kind.
    fn validate_message_schema(&self, message: &Message) -> Result<(), ValidationError> {
        let require = |field: &'static str, kind: &'static str| {
            if message.data.contains_key(field) {
                Ok(())
            } else {
                Err(ValidationError::MissingField { kind, field })
            }
        };

        match message.kind {
            MessageKind::JobApplication => {
                require("position", "job_application")?;
                require("resume", "job_application")
            }
            MessageKind::InterviewInvite => {
                require("datetime", "interview_invite")?;
                require("type", "interview_invite")
            }
            MessageKind::OfferLetter => {
                require("position", "offer_letter")?;
                require("salary", "offer_letter")
            }
            MessageKind::ContractSign => require("contract_hash", "contract_sign"),
            _ => {
                if message.data.is_empty() {
                    return Err(ValidationError::EmptyField("message data"));
                }
                Ok(())
            }
        }
    }

    /// Validate a state update against its channel.
    pub fn validate_state_update(
        &self,
        update: &StateUpdate,
        channel: &Channel,
    ) -> Result<(), ValidationError> {
        if update.channel_id != channel.id {
            return Err(ValidationError::ChannelMismatch);
        }

        let expected = channel.nonce + 1;
        if update.nonce != expected {
            return Err(ValidationError::NonceMismatch {
                expected,
                got: update.nonce,
            });
        }
        if update.timestamp < channel.updated_at {
            return Err(ValidationError::StaleUpdate);
        }
        if update.signatures.is_empty() {
            return Err(ValidationError::NoSignatures);
        }

        canonical::check_data_bounds(&update.data, self.max_data_bytes)?;

        let payload =
            canonical::state_update_bytes(&update.channel_id, update.nonce, update.timestamp);
        for signature in &update.signatures {
            self.validate_participant_signature(&payload, signature, channel)?;
        }
        Ok(())
    }

    /// Validate a close request's signature and timestamp.
    pub fn validate_close(
        &self,
        channel: &Channel,
        signature: &Signature,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.validate_timestamp(timestamp, now)?;
        let payload = canonical::close_bytes(&channel.id, timestamp);
        self.validate_participant_signature(&payload, signature, channel)
    }

    /// Check an operation is permitted for an address on a channel.
    pub fn validate_access(
        &self,
        address: &Address,
        channel: &Channel,
        access: Access,
    ) -> Result<(), ValidationError> {
        if !channel.is_participant(address) {
            return Err(ValidationError::NotParticipant(*address));
        }
        match access {
            Access::Read => Ok(()),
            Access::Write => {
                if !channel.state.is_writable() {
                    return Err(ValidationError::NotWritable);
                }
                Ok(())
            }
            // any participant may close a non-closed channel; the state
            // check belongs to the manager
            Access::Close => Ok(()),
        }
    }

    /// Timestamp skew bounds: at most 5 minutes ahead, at most 24 hours
    /// behind.
    fn validate_timestamp(
        &self,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if timestamp > now + Duration::minutes(5) {
            return Err(ValidationError::TimestampInFuture);
        }
        if timestamp < now - Duration::hours(24) {
            return Err(ValidationError::TimestampTooOld);
        }
        Ok(())
    }

    /// Flag senders whose message count within the window exceeds the
    /// burst threshold.
    pub fn detect_burst(
        &self,
        messages: &[Message],
        window: Duration,
        now: DateTime<Utc>,
    ) -> Vec<Address> {
        let cutoff = now - window;
        let mut counts: HashMap<Address, usize> = HashMap::new();
        for message in messages {
            if message.timestamp > cutoff {
                *counts.entry(message.from).or_default() += 1;
            }
        }

        let mut flagged: Vec<Address> = counts
            .into_iter()
            .filter(|(_, count)| *count > self.burst_threshold)
            .map(|(address, _)| address)
            .collect();
        flagged.sort();
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Keypair, SigBytes};
    use crate::types::{ChannelId, ChannelState, Role};
    use serde_json::{json, Map};
    use std::collections::HashMap as StdHashMap;

    struct Party {
        keypair: Keypair,
        participant: Participant,
    }

    fn party(role: Role, name: &str) -> Party {
        let keypair = Keypair::generate();
        let participant = Participant {
            address: keypair.address(),
            public_key: keypair.public_key(),
            role,
            name: name.to_string(),
            metadata: StdHashMap::new(),
        };
        Party { keypair, participant }
    }

    fn open_channel(a: &Party, b: &Party) -> Channel {
        let now = Utc::now();
        Channel {
            id: ChannelId::random(),
            participants: [a.participant.clone(), b.participant.clone()],
            state: ChannelState::Open,
            nonce: 0,
            balance: StdHashMap::new(),
            data: Map::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(24),
            chain_tx: None,
            closing_initiator: None,
        }
    }

    fn signed_message(
        from: &Party,
        to: &Party,
        channel: &Channel,
        kind: MessageKind,
        data: Map<String, serde_json::Value>,
    ) -> Message {
        let mut message = Message {
            id: "msg-1".into(),
            channel_id: channel.id,
            kind,
            from: from.participant.address,
            to: to.participant.address,
            data,
            nonce: 1,
            timestamp: Utc::now(),
            signature: Signature {
                address: from.participant.address,
                bytes: SigBytes([0; 65]),
            },
        };
        let payload = canonical::message_bytes(&message);
        let digest = keccak256(&payload);
        message.signature.bytes = from.keypair.sign_prehash(&digest).unwrap();
        message
    }

    #[test]
    fn test_participant_address_binding() {
        let validator = Validator::default();
        let mut p = party(Role::Candidate, "sam").participant;
        assert!(validator.validate_participant(&p).is_ok());

        p.address = Keypair::generate().address();
        assert!(matches!(
            validator.validate_participant(&p),
            Err(ValidationError::AddressMismatch)
        ));
    }

    #[test]
    fn test_channel_creation_rules() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");

        let mut request = ChannelOpenRequest {
            participant_a: a.participant.clone(),
            participant_b: b.participant.clone(),
            initial_data: Map::new(),
            expiry_hours: Some(48.0),
        };
        assert!(validator.validate_channel_creation(&request).is_ok());

        request.participant_b.role = Role::Candidate;
        assert!(matches!(
            validator.validate_channel_creation(&request),
            Err(ValidationError::DuplicateRole)
        ));

        request.participant_b = a.participant.clone();
        assert!(matches!(
            validator.validate_channel_creation(&request),
            Err(ValidationError::DuplicateParticipant)
        ));

        request.participant_b = b.participant.clone();
        request.expiry_hours = Some(9000.0);
        assert!(matches!(
            validator.validate_channel_creation(&request),
            Err(ValidationError::InvalidExpiry(_))
        ));

        request.expiry_hours = Some(0.0);
        assert!(validator.validate_channel_creation(&request).is_err());
    }

    #[test]
    fn test_signature_recovery_and_mismatch() {
        let validator = Validator::default();
        let signer = Keypair::generate();
        let payload = b"accept:0011";
        let digest = keccak256(payload);

        let good = Signature {
            address: signer.address(),
            bytes: signer.sign_prehash(&digest).unwrap(),
        };
        assert!(validator.validate_signature(payload, &good).is_ok());

        // claiming someone else's address must fail
        let bad = Signature {
            address: Keypair::generate().address(),
            ..good
        };
        assert!(matches!(
            validator.validate_signature(payload, &bad),
            Err(ValidationError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let validator = Validator::default();
        let signer = Keypair::generate();
        let payload = b"close:0011";
        let digest = keccak256(payload);

        let mut signature = Signature {
            address: signer.address(),
            bytes: signer.sign_prehash(&digest).unwrap(),
        };
        signature.bytes.0[10] ^= 0x01;

        assert!(validator.validate_signature(payload, &signature).is_err());
    }

    #[test]
    fn test_message_happy_path() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let channel = open_channel(&a, &b);

        let mut data = Map::new();
        data.insert("position".into(), json!("dev"));
        data.insert("resume".into(), json!("hash://resume"));
        let message = signed_message(&a, &b, &channel, MessageKind::JobApplication, data);

        assert!(validator
            .validate_message(&message, &channel, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_message_schema_by_kind() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let channel = open_channel(&a, &b);

        let mut data = Map::new();
        data.insert("position".into(), json!("dev"));
        let message = signed_message(&a, &b, &channel, MessageKind::JobApplication, data);
        assert!(matches!(
            validator.validate_message(&message, &channel, Utc::now()),
            Err(ValidationError::MissingField { field: "resume", .. })
        ));

        let mut data = Map::new();
        data.insert("position".into(), json!("dev"));
        data.insert("salary".into(), json!("60k"));
        let offer = signed_message(&b, &a, &channel, MessageKind::OfferLetter, data);
        assert!(validator
            .validate_message(&offer, &channel, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_message_from_equals_to() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let channel = open_channel(&a, &b);

        let mut data = Map::new();
        data.insert("note".into(), json!("hi"));
        let mut message = signed_message(&a, &b, &channel, MessageKind::ResumeRequest, data);
        message.to = message.from;

        assert!(matches!(
            validator.validate_message(&message, &channel, Utc::now()),
            Err(ValidationError::SelfAddressed)
        ));
    }

    #[test]
    fn test_message_outsider_rejected() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let outsider = party(Role::Candidate, "eve");
        let channel = open_channel(&a, &b);

        let mut data = Map::new();
        data.insert("note".into(), json!("hi"));
        let message = signed_message(&outsider, &b, &channel, MessageKind::ResumeRequest, data);

        assert!(matches!(
            validator.validate_message(&message, &channel, Utc::now()),
            Err(ValidationError::NotParticipant(_))
        ));
    }

    #[test]
    fn test_message_timestamp_skew() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let channel = open_channel(&a, &b);

        let mut data = Map::new();
        data.insert("note".into(), json!("hi"));
        let mut message = signed_message(&a, &b, &channel, MessageKind::ResumeRequest, data);

        message.timestamp = Utc::now() + Duration::minutes(10);
        assert!(matches!(
            validator.validate_message(&message, &channel, Utc::now()),
            Err(ValidationError::TimestampInFuture)
        ));

        message.timestamp = Utc::now() - Duration::hours(25);
        assert!(matches!(
            validator.validate_message(&message, &channel, Utc::now()),
            Err(ValidationError::TimestampTooOld)
        ));
    }

    #[test]
    fn test_state_update_rules() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let channel = open_channel(&a, &b);

        let timestamp = Utc::now();
        let payload = canonical::state_update_bytes(&channel.id, 1, timestamp);
        let digest = keccak256(&payload);

        let mut update = StateUpdate {
            channel_id: channel.id,
            nonce: 1,
            data: Map::new(),
            timestamp,
            signatures: vec![Signature {
                address: b.participant.address,
                bytes: b.keypair.sign_prehash(&digest).unwrap(),
            }],
        };
        assert!(validator.validate_state_update(&update, &channel).is_ok());

        // nonce replay
        update.nonce = 0;
        assert!(matches!(
            validator.validate_state_update(&update, &channel),
            Err(ValidationError::NonceMismatch { expected: 1, got: 0 })
        ));
        update.nonce = 1;

        // no signatures
        let signatures = std::mem::take(&mut update.signatures);
        assert!(matches!(
            validator.validate_state_update(&update, &channel),
            Err(ValidationError::NoSignatures)
        ));
        update.signatures = signatures;

        // stale timestamp
        update.timestamp = channel.updated_at - Duration::seconds(10);
        assert!(matches!(
            validator.validate_state_update(&update, &channel),
            Err(ValidationError::StaleUpdate)
        ));
    }

    #[test]
    fn test_state_update_outsider_signature() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let outsider = party(Role::Recruiter, "eve");
        let channel = open_channel(&a, &b);

        let timestamp = Utc::now();
        let payload = canonical::state_update_bytes(&channel.id, 1, timestamp);
        let digest = keccak256(&payload);

        let update = StateUpdate {
            channel_id: channel.id,
            nonce: 1,
            data: Map::new(),
            timestamp,
            signatures: vec![Signature {
                address: outsider.participant.address,
                bytes: outsider.keypair.sign_prehash(&digest).unwrap(),
            }],
        };

        assert!(matches!(
            validator.validate_state_update(&update, &channel),
            Err(ValidationError::SignerNotParticipant(_))
        ));
    }

    #[test]
    fn test_access_rules() {
        let validator = Validator::default();
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let mut channel = open_channel(&a, &b);
        let addr = a.participant.address;

        assert!(validator.validate_access(&addr, &channel, Access::Read).is_ok());
        assert!(validator.validate_access(&addr, &channel, Access::Write).is_ok());
        assert!(validator.validate_access(&addr, &channel, Access::Close).is_ok());

        channel.state = ChannelState::Closing;
        assert!(validator.validate_access(&addr, &channel, Access::Read).is_ok());
        assert!(matches!(
            validator.validate_access(&addr, &channel, Access::Write),
            Err(ValidationError::NotWritable)
        ));

        let outsider = Keypair::generate().address();
        assert!(matches!(
            validator.validate_access(&outsider, &channel, Access::Read),
            Err(ValidationError::NotParticipant(_))
        ));
    }

    #[test]
    fn test_burst_detection() {
        let validator = Validator::new(DEFAULT_MAX_DATA_BYTES, 5);
        let a = party(Role::Candidate, "sam");
        let b = party(Role::Recruiter, "acme");
        let channel = open_channel(&a, &b);
        let now = Utc::now();

        let mut messages = Vec::new();
        for i in 0..10 {
            let mut data = Map::new();
            data.insert("note".into(), json!(i));
            messages.push(signed_message(&a, &b, &channel, MessageKind::ResumeRequest, data));
        }
        // one quiet sender
        let mut data = Map::new();
        data.insert("note".into(), json!("ok"));
        messages.push(signed_message(&b, &a, &channel, MessageKind::ResumeRequest, data));

        let flagged = validator.detect_burst(&messages, Duration::minutes(1), now);
        assert_eq!(flagged, vec![a.participant.address]);
    }
}
