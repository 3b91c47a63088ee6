//! Signed, hash-linked command blocks.
//!
//! A block embeds the executed command, the post-command state hash, and the
//! link to its predecessor. `hash` is SHA-256 over the canonical encoding of
//! the block with `hash` and `signature` removed; `signature` is Ed25519 over
//! the raw hash bytes. Both are stored as lowercase hex.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nodecoin_engine::command::{CommandKind, GameCommand};
use nodecoin_engine::content::Biome;
use nodecoin_engine::state::PlayerState;

use crate::canonical::{canonical_encode, sha256_hex};
use crate::keys::{verify_signature_hex, PlayerKeypair};
use crate::ChainError;

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Hash of the previous block; empty string for genesis.
    pub prev_hash: String,
    /// Sequential position in the chain, 0 for genesis.
    pub index: u64,
    pub player_id: String,
    pub command: GameCommand,
    /// SHA-256 of the canonical state encoding after this command ran.
    pub state_hash: String,
    /// Wall-clock milliseconds when the block was created.
    pub timestamp: u64,
    /// Lowercase-hex Ed25519 public key; constant across a player's chain.
    pub public_key: String,
    /// SHA-256 over the canonical block encoding (minus hash + signature).
    pub hash: String,
    /// Ed25519 over the raw hash bytes, lowercase hex.
    pub signature: String,
}

impl Block {
    /// Build, hash, and sign a block.
    pub fn create(
        prev_hash: &str,
        index: u64,
        player_id: &str,
        command: GameCommand,
        state_hash: &str,
        timestamp: u64,
        keypair: &PlayerKeypair,
    ) -> Result<Self, ChainError> {
        let mut block = Self {
            prev_hash: prev_hash.to_owned(),
            index,
            player_id: player_id.to_owned(),
            command,
            state_hash: state_hash.to_owned(),
            timestamp,
            public_key: keypair.public_key_hex(),
            hash: String::new(),
            signature: String::new(),
        };
        block.hash = block.compute_hash()?;
        let hash_bytes = hex::decode(&block.hash)
            .map_err(|e| ChainError::InvalidHashEncoding(e.to_string()))?;
        block.signature = keypair.sign_hex(&hash_bytes);
        Ok(block)
    }

    /// Build the genesis block for a new player.
    pub fn genesis(
        player_id: &str,
        player_name: &str,
        biome: Biome,
        seed: &str,
        timestamp: u64,
        state_hash: &str,
        keypair: &PlayerKeypair,
    ) -> Result<Self, ChainError> {
        let command = GameCommand {
            kind: CommandKind::Genesis {
                player_name: player_name.to_owned(),
                biome,
                seed: seed.to_owned(),
            },
            tick: 0,
        };
        Self::create("", 0, player_id, command, state_hash, timestamp, keypair)
    }

    /// Recompute this block's hash from its contents.
    pub fn compute_hash(&self) -> Result<String, ChainError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("hash");
            map.remove("signature");
        }
        Ok(sha256_hex(canonical_encode(&value).as_bytes()))
    }

    /// Whether the stored signature verifies over the stored hash under the
    /// stored public key. Does not recompute the hash.
    pub fn verify_signature(&self) -> bool {
        let Ok(hash_bytes) = hex::decode(&self.hash) else {
            return false;
        };
        verify_signature_hex(&self.public_key, &hash_bytes, &self.signature)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// The wire `type` string of the embedded command.
    pub fn command_type(&self) -> &'static str {
        self.command.kind.type_name()
    }
}

// ---------------------------------------------------------------------------
// State hashing
// ---------------------------------------------------------------------------

/// SHA-256 over the canonical encoding of a player state.
pub fn state_hash(state: &PlayerState) -> Result<String, ChainError> {
    let value = serde_json::to_value(state)?;
    Ok(sha256_hex(canonical_encode(&value).as_bytes()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> PlayerKeypair {
        PlayerKeypair::from_seed("block-tests")
    }

    fn build_command(tick: u64) -> GameCommand {
        GameCommand {
            kind: CommandKind::Build {
                building_id: "choza".into(),
            },
            tick,
        }
    }

    // -- 1. Hash and signature ------------------------------------------------

    #[test]
    fn created_block_hash_matches_recomputation() {
        let block = Block::create("", 0, "p1", build_command(0), "abc", 1_000, &keypair()).unwrap();
        assert_eq!(block.hash, block.compute_hash().unwrap());
        assert_eq!(block.hash.len(), 64);
        assert!(block.verify_signature());
    }

    #[test]
    fn tampering_breaks_the_hash() {
        let mut block =
            Block::create("", 0, "p1", build_command(0), "abc", 1_000, &keypair()).unwrap();
        block.state_hash = "ff".repeat(32);
        assert_ne!(block.hash, block.compute_hash().unwrap());
    }

    #[test]
    fn tampering_hash_breaks_the_signature() {
        let mut block =
            Block::create("", 0, "p1", build_command(0), "abc", 1_000, &keypair()).unwrap();
        block.hash = sha256_hex(b"some other pre-image");
        assert!(!block.verify_signature());
    }

    #[test]
    fn signature_is_128_hex_chars() {
        let block = Block::create("", 0, "p1", build_command(0), "abc", 1_000, &keypair()).unwrap();
        assert_eq!(block.signature.len(), 128);
        assert!(block.signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // -- 2. Genesis ------------------------------------------------------------

    #[test]
    fn genesis_shape() {
        let block = Block::genesis(
            "p1",
            "Test",
            Biome::Forest,
            "seed-1",
            1_000,
            "statehash",
            &keypair(),
        )
        .unwrap();
        assert!(block.is_genesis());
        assert_eq!(block.prev_hash, "");
        assert_eq!(block.index, 0);
        assert_eq!(block.command_type(), "genesis");
        assert!(block.verify_signature());
    }

    // -- 3. Wire format -----------------------------------------------------------

    #[test]
    fn block_serializes_camel_case() {
        let block = Block::create("", 0, "p1", build_command(0), "abc", 1_000, &keypair()).unwrap();
        let v = serde_json::to_value(&block).unwrap();
        assert!(v.get("prevHash").is_some());
        assert!(v.get("stateHash").is_some());
        assert!(v.get("publicKey").is_some());
        assert_eq!(v["command"]["type"], "build");

        let back: Block = serde_json::from_value(v).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn hash_is_stable_across_serde_round_trip() {
        let block = Block::create("", 0, "p1", build_command(3), "abc", 1_000, &keypair()).unwrap();
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back.compute_hash().unwrap(), block.hash);
    }

    // -- 4. State hash -------------------------------------------------------------

    #[test]
    fn state_hash_is_deterministic() {
        let state = PlayerState::create_new("p1", "Test", Biome::Forest, 0);
        let a = state_hash(&state).unwrap();
        let b = state_hash(&state.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn state_hash_reflects_changes() {
        let state = PlayerState::create_new("p1", "Test", Biome::Forest, 0);
        let mut changed = state.clone();
        changed.tokens += 1.0;
        assert_ne!(state_hash(&state).unwrap(), state_hash(&changed).unwrap());
    }
}
