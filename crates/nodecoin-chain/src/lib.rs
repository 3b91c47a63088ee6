//! Nodecoin Chain -- per-player signed command chains.
//!
//! Canonical JSON encoding, Ed25519 identities, hash-linked signed blocks,
//! and pure chain validators. The chain is the authenticated record of every
//! command a player executed; remote nodes accept a player's blocks only in
//! index order under the public key pinned at genesis.

#![deny(unsafe_code)]

pub mod block;
pub mod canonical;
pub mod chain;
pub mod keys;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by chain operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Block or state serialization failed.
    #[error("chain serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key could not be decoded or reconstructed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored hash was not valid lowercase hex.
    #[error("invalid hash encoding: {0}")]
    InvalidHashEncoding(String),

    /// A persisted block sequence failed validation.
    #[error("invalid chain at index {index:?}: {detail}")]
    InvalidChain {
        index: Option<u64>,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::block::{state_hash, Block};
    pub use crate::canonical::{canonical_encode, hash_value, sha256_hex};
    pub use crate::chain::{
        validate_chain, validate_chain_with_replay, ChainValidation, CommandChain,
    };
    pub use crate::keys::{
        derive_address, derive_address_hex, is_valid_address, verify_signature_hex, PlayerKeypair,
    };
    pub use crate::ChainError;
}
