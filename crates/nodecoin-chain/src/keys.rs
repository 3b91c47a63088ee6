//! Player identity: Ed25519 keypairs and node addresses.
//!
//! A player's public key is pinned at genesis and must stay constant across
//! their whole chain. The node address is a short human-pasteable handle
//! derived from the public key: `"NC"` followed by the hex of the first 20
//! bytes of the key's SHA-512 digest (42 characters total).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::canonical::sha512_bytes;
use crate::ChainError;

// ---------------------------------------------------------------------------
// PlayerKeypair
// ---------------------------------------------------------------------------

/// An Ed25519 signing identity for one player.
#[derive(Clone)]
pub struct PlayerKeypair {
    signing: SigningKey,
}

impl std::fmt::Debug for PlayerKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret half.
        f.debug_struct("PlayerKeypair")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

impl PlayerKeypair {
    /// Generate a fresh random keypair from OS entropy.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut csprng),
        }
    }

    /// Derive a keypair deterministically from a seed string.
    ///
    /// Used when the launcher is given an explicit `--seed`, so a node
    /// restarted with the same seed keeps its identity.
    pub fn from_seed(seed: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        Self {
            signing: SigningKey::from_bytes(&digest),
        }
    }

    /// Rebuild a keypair from a 32-byte secret key.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidKey("secret key must be 32 bytes".into()))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&secret),
        })
    }

    /// The 32-byte secret key, for persistence.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Lowercase-hex public key (64 chars).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    /// Sign raw bytes; returns the lowercase-hex signature (128 chars).
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing.sign(message).to_bytes())
    }

    /// The node address derived from this keypair's public key.
    pub fn address(&self) -> String {
        derive_address(&self.signing.verifying_key().to_bytes())
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a hex signature over `message` under a hex public key.
///
/// Malformed keys or signatures verify as `false`; remote input never turns
/// into a local error.
pub fn verify_signature_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_array) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_array);
    verifying.verify(message, &signature).is_ok()
}

// ---------------------------------------------------------------------------
// Node addresses
// ---------------------------------------------------------------------------

/// Address prefix.
pub const ADDRESS_PREFIX: &str = "NC";

/// Total address length: `"NC"` + 40 hex chars.
pub const ADDRESS_LEN: usize = 42;

/// `"NC" + hex(first 20 bytes of sha512(public_key))`.
pub fn derive_address(public_key: &[u8]) -> String {
    let digest = sha512_bytes(public_key);
    format!("{ADDRESS_PREFIX}{}", hex::encode(&digest[..20]))
}

/// Derive an address from a lowercase-hex public key.
pub fn derive_address_hex(public_key_hex: &str) -> Result<String, ChainError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| ChainError::InvalidKey(format!("bad public key hex: {e}")))?;
    Ok(derive_address(&bytes))
}

/// Whether a string has exactly the node-address shape.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address.starts_with(ADDRESS_PREFIX)
        && address[ADDRESS_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- 1. Deterministic derivation ------------------------------------------

    #[test]
    fn seeded_keypairs_are_reproducible() {
        let a = PlayerKeypair::from_seed("my-node-seed");
        let b = PlayerKeypair::from_seed("my-node-seed");
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn different_seeds_different_keys() {
        let a = PlayerKeypair::from_seed("seed-a");
        let b = PlayerKeypair::from_seed("seed-b");
        assert_ne!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn secret_round_trip() {
        let a = PlayerKeypair::from_seed("persist-me");
        let b = PlayerKeypair::from_secret_bytes(&a.secret_bytes()).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn bad_secret_length_rejected() {
        assert!(PlayerKeypair::from_secret_bytes(&[0u8; 16]).is_err());
    }

    // -- 2. Sign and verify -----------------------------------------------------

    #[test]
    fn sign_verify_round_trip() {
        let keypair = PlayerKeypair::from_seed("signer");
        let message = b"block-hash-bytes";
        let signature = keypair.sign_hex(message);
        assert_eq!(signature.len(), 128);
        assert!(verify_signature_hex(&keypair.public_key_hex(), message, &signature));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let keypair = PlayerKeypair::from_seed("signer");
        let signature = keypair.sign_hex(b"original");
        assert!(!verify_signature_hex(&keypair.public_key_hex(), b"tampered", &signature));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signer = PlayerKeypair::from_seed("signer");
        let other = PlayerKeypair::from_seed("other");
        let signature = signer.sign_hex(b"msg");
        assert!(!verify_signature_hex(&other.public_key_hex(), b"msg", &signature));
    }

    #[test]
    fn malformed_inputs_verify_false_not_panic() {
        assert!(!verify_signature_hex("zz", b"msg", "zz"));
        assert!(!verify_signature_hex("abcd", b"msg", "abcd"));
        let keypair = PlayerKeypair::from_seed("k");
        assert!(!verify_signature_hex(&keypair.public_key_hex(), b"msg", "00"));
    }

    // -- 3. Addresses --------------------------------------------------------------

    #[test]
    fn address_shape() {
        let keypair = PlayerKeypair::from_seed("addr");
        let address = keypair.address();
        assert_eq!(address.len(), ADDRESS_LEN);
        assert!(address.starts_with("NC"));
        assert!(is_valid_address(&address));
    }

    #[test]
    fn invalid_addresses_rejected() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("NC"));
        // Wrong prefix.
        assert!(!is_valid_address(&format!("XX{}", "0".repeat(40))));
        // Uppercase hex is not canonical.
        assert!(!is_valid_address(&format!("NCAB{}", "0".repeat(38))));
        // One char short / one long.
        assert!(!is_valid_address(&format!("NC{}", "0".repeat(39))));
        assert!(!is_valid_address(&format!("NC{}", "0".repeat(41))));
        // Non-hex tail.
        assert!(!is_valid_address(&format!("NC{}g", "0".repeat(39))));
    }

    #[test]
    fn address_matches_hex_derivation() {
        let keypair = PlayerKeypair::from_seed("addr2");
        let via_hex = derive_address_hex(&keypair.public_key_hex()).unwrap();
        assert_eq!(via_hex, keypair.address());
    }
}
