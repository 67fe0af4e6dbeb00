//! Cryptographic primitives for the parley coordinator.
//!
//! Wraps secp256k1 ECDSA (with public-key recovery) and the SHA-256 /
//! Keccak-256 digests with strong types. Addresses follow the Ethereum
//! convention: the last 20 bytes of keccak256 over the uncompressed
//! public key without its 0x04 prefix.

use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use std::fmt;

use crate::error::CryptoError;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    /// Compute the SHA-256 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Hash the concatenation of several byte slices.
    pub fn hash_concat(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Double SHA-256 (Bitcoin style).
    pub fn double(data: &[u8]) -> Self {
        Self::hash(&Self::hash(data).0)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::KeyLength {
            expected: 32,
            got: s.len() / 2,
        })?;
        Ok(Self(arr))
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Keccak-256 hash function.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA256 with the standard 64-byte block construction.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Hash a block header: 76 bytes of big-endian fields, then SHA-256.
///
/// Layout: prev_hash(32) | merkle_root(32) | timestamp(4) | difficulty(4) | nonce(4).
pub fn hash_block_header(
    prev_hash: &[u8; 32],
    merkle_root: &[u8; 32],
    timestamp: u32,
    difficulty: u32,
    nonce: u32,
) -> Sha256Hash {
    let mut buf = [0u8; 76];
    buf[..32].copy_from_slice(prev_hash);
    buf[32..64].copy_from_slice(merkle_root);
    buf[64..68].copy_from_slice(&timestamp.to_be_bytes());
    buf[68..72].copy_from_slice(&difficulty.to_be_bytes());
    buf[72..76].copy_from_slice(&nonce.to_be_bytes());
    Sha256Hash::hash(&buf)
}

/// Hash a transaction: decimal/UTF-8 field concatenation with the signature
/// appended, then SHA-256.
pub fn hash_transaction(
    from: &str,
    to: &str,
    value: u64,
    data: &[u8],
    timestamp: u32,
    kind: &str,
    signature: &[u8],
) -> Sha256Hash {
    let mut buf = Vec::with_capacity(from.len() + to.len() + data.len() + kind.len() + 32);
    buf.extend_from_slice(from.as_bytes());
    buf.extend_from_slice(to.as_bytes());
    buf.extend_from_slice(value.to_string().as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(timestamp.to_string().as_bytes());
    buf.extend_from_slice(kind.as_bytes());
    buf.extend_from_slice(signature);
    Sha256Hash::hash(&buf)
}

/// A 20-byte account address derived from a secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to the canonical `0x`-prefixed lowercase hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)?;
        let arr: [u8; 20] = bytes.try_into().map_err(|_| CryptoError::KeyLength {
            expected: 20,
            got: stripped.len() / 2,
        })?;
        Ok(Self(arr))
    }

    /// The zero address (sentinel value).
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// A secp256k1 public key in uncompressed SEC1 form (65 bytes, 0x04 prefix).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 65]);

impl PublicKey {
    /// Create from raw uncompressed SEC1 bytes, checking the point is on
    /// the curve.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 65 {
            return Err(CryptoError::KeyLength {
                expected: 65,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; 65];
        arr.copy_from_slice(bytes);
        let key = Self(arr);
        key.verifying_key()?;
        Ok(key)
    }

    fn from_verifying_key(vk: &VerifyingKey) -> Self {
        let point = vk.to_encoded_point(false);
        let mut arr = [0u8; 65];
        arr.copy_from_slice(point.as_bytes());
        Self(arr)
    }

    /// Parse the wrapped bytes into a verifying key, rejecting off-curve
    /// points.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Derive the account address: last 20 bytes of keccak256 over the
    /// uncompressed key without its prefix byte.
    pub fn address(&self) -> Address {
        let digest = keccak256(&self.0[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        Address(addr)
    }

    /// Verify a signature over `sha256(message)`. The recovery byte is
    /// ignored.
    pub fn verify(&self, message: &[u8], signature: &SigBytes) -> Result<(), CryptoError> {
        let vk = self.verifying_key()?;
        let sig = EcdsaSignature::from_slice(&signature.0[..64])
            .map_err(|_| CryptoError::InvalidSignature)?;
        let digest = Sha256Hash::hash(message);
        vk.verify_prehash(&digest.0, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 130-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        Self::from_sec1_bytes(&bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        if bytes.len() != 65 {
            return Err(D::Error::custom("public key must be 65 bytes"));
        }
        let mut arr = [0u8; 65];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// A 65-byte recoverable ECDSA signature in `r || s || v` form.
///
/// Signatures are emitted with `v` in {0, 1}; the parse path also accepts
/// the Ethereum convention {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SigBytes(pub [u8; 65]);

impl SigBytes {
    /// Create from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 65 {
            return Err(CryptoError::SignatureLength(bytes.len()));
        }
        let mut arr = [0u8; 65];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Reassemble from components.
    pub fn from_parts(r: &[u8; 32], s: &[u8; 32], v: u8) -> Self {
        let mut arr = [0u8; 65];
        arr[..32].copy_from_slice(r);
        arr[32..64].copy_from_slice(s);
        arr[64] = v;
        Self(arr)
    }

    /// The r component.
    pub fn r(&self) -> [u8; 32] {
        self.0[..32].try_into().expect("slice is 32 bytes")
    }

    /// The s component.
    pub fn s(&self) -> [u8; 32] {
        self.0[32..64].try_into().expect("slice is 32 bytes")
    }

    /// The recovery byte.
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 130-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for SigBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigBytes({}...)", &self.to_hex()[..16])
    }
}

impl Serialize for SigBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SigBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// A secp256k1 keypair for signing channel traffic.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from a 32-byte secret scalar.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(seed).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Parse the secret key from hex.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyLength {
                expected: 32,
                got: bytes.len(),
            })?;
        Self::from_seed(&arr)
    }

    /// The secret key as hex (handle with care).
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Derive the account address.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign `sha256(message)`, returning a 65-byte recoverable signature.
    pub fn sign(&self, message: &[u8]) -> Result<SigBytes, CryptoError> {
        let digest = Sha256Hash::hash(message);
        self.sign_prehash(&digest.0)
    }

    /// Sign a precomputed 32-byte digest.
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<SigBytes, CryptoError> {
        let (sig, recid) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|_| CryptoError::SigningFailed)?;
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recid.to_byte();
        Ok(SigBytes(bytes))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// Recover the signer's public key from a signature over `sha256(message)`.
pub fn recover(message: &[u8], signature: &SigBytes) -> Result<PublicKey, CryptoError> {
    let digest = Sha256Hash::hash(message);
    recover_prehash(&digest.0, signature)
}

/// Recover the signer's public key from a signature over a precomputed
/// 32-byte digest.
pub fn recover_prehash(prehash: &[u8; 32], signature: &SigBytes) -> Result<PublicKey, CryptoError> {
    let recid = parse_recovery_id(signature.v())?;
    let sig = EcdsaSignature::from_slice(&signature.0[..64])
        .map_err(|_| CryptoError::InvalidSignature)?;
    let vk = VerifyingKey::recover_from_prehash(prehash, &sig, recid)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(PublicKey::from_verifying_key(&vk))
}

/// Parse a recovery byte. Valid values: 0, 1, 27, 28.
fn parse_recovery_id(v: u8) -> Result<RecoveryId, CryptoError> {
    let id = match v {
        0 | 27 => 0u8,
        1 | 28 => 1u8,
        _ => return Err(CryptoError::RecoveryId(v)),
    };
    RecoveryId::try_from(id).map_err(|_| CryptoError::RecoveryId(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let keypair = Keypair::generate();
        let message = b"offer: junior backend engineer";
        let signature = keypair.sign(message).unwrap();

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        let tampered = b"offer: senior backend engineer";
        assert!(keypair.public_key().verify(tampered, &signature).is_err());
    }

    #[test]
    fn test_recover_matches_signer() {
        let keypair = Keypair::generate();
        let message = b"resume request";
        let signature = keypair.sign(message).unwrap();

        let recovered = recover(message, &signature).unwrap();
        assert_eq!(recovered, keypair.public_key());
        assert_eq!(recovered.address(), keypair.address());
    }

    #[test]
    fn test_recovery_byte_ethereum_convention() {
        let keypair = Keypair::generate();
        let message = b"contract";
        let mut signature = keypair.sign(message).unwrap();
        assert!(signature.v() == 0 || signature.v() == 1);

        // v + 27 must recover to the same key
        signature.0[64] += 27;
        let recovered = recover(message, &signature).unwrap();
        assert_eq!(recovered, keypair.public_key());

        signature.0[64] = 5;
        assert!(matches!(
            recover(message, &signature),
            Err(CryptoError::RecoveryId(5))
        ));
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        let kp1 = Keypair::from_seed(&seed).unwrap();
        let kp2 = Keypair::from_seed(&seed).unwrap();
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.address(), kp2.address());
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_hex(&keypair.secret_hex()).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn test_address_derivation_many_keys() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let keypair = Keypair::generate();
            let addr = keypair.address();
            assert_eq!(addr.as_bytes().len(), 20);
            // Deterministic for a fixed key
            assert_eq!(addr, keypair.public_key().address());
            assert!(seen.insert(addr), "address collision");
        }
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Keypair::generate().address();
        let hex = addr.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(Address::from_hex(&hex).unwrap(), addr);
        // prefix is optional on parse
        assert_eq!(Address::from_hex(&hex[2..]).unwrap(), addr);
    }

    #[test]
    fn test_public_key_rejects_off_curve() {
        let mut bytes = [0u8; 65];
        bytes[0] = 0x04;
        bytes[1] = 0xff;
        assert!(matches!(
            PublicKey::from_sec1_bytes(&bytes),
            Err(CryptoError::InvalidPublicKey)
        ));
    }

    #[test]
    fn test_signature_length_checked() {
        assert!(matches!(
            SigBytes::from_slice(&[0u8; 64]),
            Err(CryptoError::SignatureLength(64))
        ));
    }

    #[test]
    fn test_double_sha256() {
        let data = b"block";
        let expected = Sha256Hash::hash(Sha256Hash::hash(data).as_bytes());
        assert_eq!(Sha256Hash::double(data), expected);
    }

    #[test]
    fn test_hash_block_header_layout() {
        let prev = [0x11u8; 32];
        let root = [0x22u8; 32];
        let h1 = hash_block_header(&prev, &root, 1700000000, 20, 42);
        let h2 = hash_block_header(&prev, &root, 1700000000, 20, 42);
        assert_eq!(h1, h2);

        // any field perturbs the digest
        let h3 = hash_block_header(&prev, &root, 1700000000, 20, 43);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_hash_transaction_includes_signature() {
        let sig_a = [0xaa_u8; 65];
        let sig_b = [0xbb_u8; 65];
        let h1 = hash_transaction("0xaa", "0xbb", 10, b"{}", 1700000000, "transfer", &sig_a);
        let h2 = hash_transaction("0xaa", "0xbb", 10, b"{}", 1700000000, "transfer", &sig_b);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hmac_sha256_vector() {
        // RFC 4231 test case 2
        let key = b"Jefe";
        let data = b"what do ya want for nothing?";
        let expected =
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843";
        assert_eq!(hex::encode(hmac_sha256(key, data)), expected);
    }

    #[test]
    fn test_keccak256_vector() {
        // keccak256 of the empty string
        let expected =
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(hex::encode(keccak256(b"")), expected);
    }
}
