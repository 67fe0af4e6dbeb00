//! A thin VRF built on recoverable ECDSA.
//!
//! The construction signs `sha256(seed)` and derives the pseudorandom
//! output from the signature's r component, so anyone holding the public
//! key can check that (value, proof) really came from the seed and the
//! private key. Outputs are totally orderable, which is what the leader
//! election needs.

use num_bigint::BigUint;

use crate::crypto::{Address, Keypair, PublicKey, Sha256Hash, SigBytes};
use crate::error::{CryptoError, VrfError};

/// Length of a serialized VRF proof: r(32) || s(32) || v(1) || seed_hash(32).
pub const PROOF_LEN: usize = 97;

/// Stake-weight scaling factor used in leader scores.
const STAKE_PRECISION: u64 = 1_000_000;

/// A VRF output: the pseudorandom value plus its proof of correctness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfProof {
    pub value: [u8; 32],
    pub proof: [u8; PROOF_LEN],
}

impl VrfProof {
    /// Hex forms for transport.
    pub fn to_hex(&self) -> (String, String) {
        (hex::encode(self.value), hex::encode(self.proof))
    }

    /// Parse from hex forms.
    pub fn from_hex(value_hex: &str, proof_hex: &str) -> Result<Self, CryptoError> {
        let value_bytes = hex::decode(value_hex)?;
        let proof_bytes = hex::decode(proof_hex)?;
        let value: [u8; 32] = value_bytes.try_into().map_err(|_| CryptoError::KeyLength {
            expected: 32,
            got: value_hex.len() / 2,
        })?;
        let proof: [u8; PROOF_LEN] =
            proof_bytes
                .try_into()
                .map_err(|_| CryptoError::KeyLength {
                    expected: PROOF_LEN,
                    got: proof_hex.len() / 2,
                })?;
        Ok(Self { value, proof })
    }
}

/// Produce a (value, proof) pair from a private key and seed.
pub fn vrf_generate(keypair: &Keypair, seed: &[u8]) -> Result<VrfProof, CryptoError> {
    let seed_hash = Sha256Hash::hash(seed);
    let sig = keypair.sign(&seed_hash.0)?;

    let r = sig.r();
    let value = Sha256Hash::hash_concat(&[&r, seed]).0;

    let mut proof = [0u8; PROOF_LEN];
    proof[..32].copy_from_slice(&r);
    proof[32..64].copy_from_slice(&sig.s());
    proof[64] = sig.v();
    proof[65..].copy_from_slice(&seed_hash.0);

    Ok(VrfProof { value, proof })
}

/// Verify a (value, proof) pair against the signer's public key and seed.
pub fn vrf_verify(public: &PublicKey, seed: &[u8], value: &[u8], proof: &[u8]) -> bool {
    if proof.len() != PROOF_LEN {
        return false;
    }

    let r: [u8; 32] = proof[..32].try_into().expect("slice is 32 bytes");
    let s: [u8; 32] = proof[32..64].try_into().expect("slice is 32 bytes");
    let v = proof[64];
    let seed_hash = &proof[65..];

    if seed_hash != Sha256Hash::hash(seed).0 {
        return false;
    }

    let sig = SigBytes::from_parts(&r, &s, v);
    if public.verify(seed_hash, &sig).is_err() {
        return false;
    }

    value == Sha256Hash::hash_concat(&[&r, seed]).0
}

/// A consensus participant eligible for leader election.
#[derive(Debug, Clone)]
pub struct StakedValidator {
    pub id: String,
    pub address: Address,
    pub vrf_key: Vec<u8>,
    pub stake: u64,
    pub active: bool,
}

/// Pick the round leader by stake-weighted VRF score.
///
/// Each active validator scores `int(sha256(vrf_key || seed)) *
/// floor(stake * 10^6 / total_stake)`; the highest score wins and ties go
/// to the lexicographically smaller address, which keeps the election
/// deterministic across nodes.
pub fn select_leader(
    validators: &[StakedValidator],
    seed: &[u8],
    total_stake: u64,
) -> Result<String, VrfError> {
    if total_stake == 0 {
        return Err(VrfError::InvalidStake);
    }

    let mut best: Option<(&StakedValidator, BigUint)> = None;

    for validator in validators.iter().filter(|v| v.active) {
        let digest = Sha256Hash::hash_concat(&[&validator.vrf_key, seed]);
        let vrf_hash = BigUint::from_bytes_be(&digest.0);
        let ratio = BigUint::from(validator.stake) * STAKE_PRECISION / total_stake;
        let score = vrf_hash * ratio;

        let replace = match &best {
            None => true,
            Some((current, current_score)) => {
                score > *current_score
                    || (score == *current_score && validator.address < current.address)
            }
        };
        if replace {
            best = Some((validator, score));
        }
    }

    best.map(|(v, _)| v.id.clone()).ok_or(VrfError::NoValidators)
}

/// Is a VRF output below the eligibility threshold?
pub fn is_leader(vrf_value: &[u8], threshold: &BigUint) -> bool {
    BigUint::from_bytes_be(vrf_value) < *threshold
}

/// Eligibility threshold for a proposer:
/// `2^256 * stake / (total_stake * target_count)`.
///
/// Degenerate inputs yield a zero threshold (nobody is eligible).
pub fn proposer_threshold(stake: u64, total_stake: u64, target_count: u64) -> BigUint {
    if stake == 0 || total_stake == 0 || target_count == 0 {
        return BigUint::default();
    }
    (BigUint::from(1u8) << 256u32) * stake / (BigUint::from(total_stake) * target_count)
}

/// Generate a random 32-byte VRF key.
pub fn generate_vrf_key() -> [u8; 32] {
    rand::random()
}

/// Check a VRF key has the expected length.
pub fn validate_vrf_key(key: &[u8]) -> Result<(), VrfError> {
    if key.len() != 32 {
        return Err(VrfError::KeyLength(key.len()));
    }
    Ok(())
}

/// Fold several VRF values into one round randomness.
pub fn combine_randomness(values: &[&[u8]]) -> [u8; 32] {
    Sha256Hash::hash_concat(values).0
}
