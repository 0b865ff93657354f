//! Cryptographic operations for the custody ledger
//!
//! This module provides:
//! - SHA-256 hashing of ledger entries over their canonical bytes
//! - The session seal over the concatenated entry hashes
//! - Ed25519 key pairs for optional seal signing

use crate::types::{LedgerEntry, SealSignature};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// `prev_hash` of entry 0
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Ed25519 key pair for sealing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a seal digest
    pub fn sign_seal(&self, seal: &str) -> SealSignature {
        let signature = self.signing_key.sign(seal.as_bytes());
        SealSignature {
            public_key: hex::encode(self.public_key()),
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

/// Check a seal signature against the key it names, or against `trusted_key`
/// when one is pinned
pub fn verify_seal_signature(
    seal: &str,
    signature: &SealSignature,
    trusted_key: Option<&[u8; 32]>,
) -> Result<()> {
    let key_bytes: [u8; 32] = hex::decode(&signature.public_key)
        .map_err(|e| Error::Signature(format!("public key is not hex: {}", e)))?
        .try_into()
        .map_err(|_| Error::Signature("public key must be 32 bytes".to_string()))?;

    if let Some(trusted) = trusted_key {
        if trusted != &key_bytes {
            return Err(Error::Signature("seal signed by an untrusted key".to_string()));
        }
    }

    let sig_bytes: [u8; 64] = hex::decode(&signature.signature)
        .map_err(|e| Error::Signature(format!("signature is not hex: {}", e)))?
        .try_into()
        .map_err(|_| Error::Signature("signature must be 64 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::Signature(format!("invalid public key: {}", e)))?;

    verifying_key
        .verify(seal.as_bytes(), &DalekSignature::from_bytes(&sig_bytes))
        .map_err(|e| Error::Signature(format!("Verification failed: {}", e)))
}

/// Hash an entry over its canonical bytes
pub fn hash_entry(entry: &LedgerEntry) -> Result<String> {
    Ok(hash_bytes(&entry.canonical_bytes()?))
}

/// SHA-256 of arbitrary bytes, lowercase hex
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Seal over an ordered sequence of entry hashes
///
/// SHA-256 of the ASCII hex hashes concatenated in sequence order.
pub fn compute_seal<'a>(entry_hashes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for hash in entry_hashes {
        hasher.update(hash.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Generate a UUIDv7 (time-ordered) session id
pub fn generate_uuid_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        // Same seed should produce same keys
        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    #[test]
    fn test_seal_signature_round_trip() {
        let keypair = KeyPair::generate();
        let seal = hash_bytes(b"seal");
        let signature = keypair.sign_seal(&seal);

        assert!(verify_seal_signature(&seal, &signature, None).is_ok());
        assert!(verify_seal_signature(&seal, &signature, Some(&keypair.public_key())).is_ok());

        // Wrong seal should fail
        let other = hash_bytes(b"other");
        assert!(verify_seal_signature(&other, &signature, None).is_err());
    }

    #[test]
    fn test_untrusted_key_rejected() {
        let keypair = KeyPair::generate();
        let stranger = KeyPair::generate();
        let seal = hash_bytes(b"seal");
        let signature = keypair.sign_seal(&seal);

        let result = verify_seal_signature(&seal, &signature, Some(&stranger.public_key()));
        assert!(matches!(result, Err(Error::Signature(_))));
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let keypair = KeyPair::generate();
        let seal = hash_bytes(b"seal");
        let mut signature = keypair.sign_seal(&seal);
        signature.signature = "zz".to_string();

        assert!(verify_seal_signature(&seal, &signature, None).is_err());
    }

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"test data");
        let hash2 = hash_bytes(b"test data");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash_bytes(b"different data"));
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_genesis_hash_shape() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn test_seal_is_order_sensitive() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        let forward = compute_seal([a.as_str(), b.as_str()]);
        let reversed = compute_seal([b.as_str(), a.as_str()]);
        assert_ne!(forward, reversed);
        assert_eq!(forward, compute_seal(vec![a.as_str(), b.as_str()]));
    }

    #[test]
    fn test_uuid_v7_generation() {
        let uuid1 = generate_uuid_v7();
        let uuid2 = generate_uuid_v7();
        assert_ne!(uuid1, uuid2);
        assert_eq!(uuid1.get_version_num(), 7);
    }
}
