//! The per-player append-only command chain and its validators.
//!
//! A chain starts with a genesis block recording `{playerName, biome, seed}`
//! and grows by one signed block per executed command. [`validate_chain`] is
//! pure structure-and-signature validation; [`validate_chain_with_replay`]
//! additionally re-executes every command through the engine and compares the
//! recorded state hashes.

use serde::{Deserialize, Serialize};

use nodecoin_engine::command::{self, CommandKind, GameCommand};
use nodecoin_engine::state::PlayerState;
use nodecoin_engine::systems;

use crate::block::{state_hash, Block};
use crate::keys::PlayerKeypair;
use crate::ChainError;

// ---------------------------------------------------------------------------
// CommandChain
// ---------------------------------------------------------------------------

/// The local player's chain: append-only, signed by one keypair.
#[derive(Debug, Clone)]
pub struct CommandChain {
    player_id: String,
    blocks: Vec<Block>,
}

impl CommandChain {
    /// Start a new chain with a genesis block.
    pub fn genesis(
        player_id: &str,
        player_name: &str,
        biome: nodecoin_engine::content::Biome,
        seed: &str,
        initial_state_hash: &str,
        timestamp: u64,
        keypair: &PlayerKeypair,
    ) -> Result<Self, ChainError> {
        let genesis = Block::genesis(
            player_id,
            player_name,
            biome,
            seed,
            timestamp,
            initial_state_hash,
            keypair,
        )?;
        Ok(Self {
            player_id: player_id.to_owned(),
            blocks: vec![genesis],
        })
    }

    /// Rebuild a chain from persisted blocks.
    ///
    /// The blocks must already be a valid chain; this is checked.
    pub fn from_blocks(blocks: Vec<Block>) -> Result<Self, ChainError> {
        let validation = validate_chain(&blocks);
        if !validation.valid {
            return Err(ChainError::InvalidChain {
                index: validation.failed_at_index,
                detail: validation.error.unwrap_or_else(|| "unknown".to_owned()),
            });
        }
        Ok(Self {
            player_id: blocks[0].player_id.clone(),
            blocks,
        })
    }

    /// Append a signed block for an executed command.
    pub fn append(
        &mut self,
        command: GameCommand,
        post_state_hash: &str,
        timestamp: u64,
        keypair: &PlayerKeypair,
    ) -> Result<&Block, ChainError> {
        let last = self.blocks.last().expect("chain always has genesis");
        let block = Block::create(
            &last.hash,
            last.index + 1,
            &self.player_id,
            command,
            post_state_hash,
            timestamp,
            keypair,
        )?;
        self.blocks.push(block);
        Ok(self.blocks.last().expect("just pushed"))
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn latest(&self) -> &Block {
        self.blocks.last().expect("chain always has genesis")
    }

    /// The newest `n` blocks, oldest first.
    pub fn tail(&self, n: usize) -> &[Block] {
        let start = self.blocks.len().saturating_sub(n);
        &self.blocks[start..]
    }

    /// Validate the whole chain structurally.
    pub fn validate(&self) -> ChainValidation {
        validate_chain(&self.blocks)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome of validating a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            failed_at_index: None,
            error: None,
        }
    }

    fn fail(index: u64, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            failed_at_index: Some(index),
            error: Some(error.into()),
        }
    }
}

/// Pure structural validation: shape, linkage, hashes, signatures, and the
/// pinned public key.
pub fn validate_chain(blocks: &[Block]) -> ChainValidation {
    if blocks.is_empty() {
        return ChainValidation {
            valid: false,
            failed_at_index: None,
            error: Some("chain is empty".to_owned()),
        };
    }

    let genesis = &blocks[0];
    if genesis.index != 0 {
        return ChainValidation::fail(0, format!("genesis index is {}", genesis.index));
    }
    if !genesis.prev_hash.is_empty() {
        return ChainValidation::fail(0, "genesis prevHash is not empty");
    }

    for (i, block) in blocks.iter().enumerate() {
        let index = i as u64;
        if block.index != index {
            return ChainValidation::fail(
                index,
                format!("index {} at position {index}", block.index),
            );
        }
        if block.player_id != genesis.player_id {
            return ChainValidation::fail(index, "playerId differs from genesis");
        }
        if i > 0 && block.prev_hash != blocks[i - 1].hash {
            return ChainValidation::fail(index, "prevHash does not match previous block");
        }
        match block.compute_hash() {
            Ok(recomputed) if recomputed == block.hash => {}
            Ok(_) => return ChainValidation::fail(index, "hash mismatch"),
            Err(e) => return ChainValidation::fail(index, format!("hash recomputation: {e}")),
        }
        if !block.verify_signature() {
            return ChainValidation::fail(index, "signature does not verify");
        }
        if block.public_key != genesis.public_key {
            return ChainValidation::fail(index, "publicKey differs from genesis");
        }
    }
    ChainValidation::ok()
}

/// Extended validation: replay every command through the engine and require
/// each block's recorded `stateHash` to match the recomputed state.
///
/// The genesis block must carry the player name and biome used to rebuild
/// the initial state.
pub fn validate_chain_with_replay(blocks: &[Block], created_at: u64) -> ChainValidation {
    let structural = validate_chain(blocks);
    if !structural.valid {
        return structural;
    }

    let genesis = &blocks[0];
    let CommandKind::Genesis {
        player_name, biome, ..
    } = &genesis.command.kind
    else {
        return ChainValidation::fail(0, "genesis block does not carry a genesis command");
    };

    let mut state = PlayerState::create_new(&genesis.player_id, player_name, *biome, created_at);
    match state_hash(&state) {
        Ok(h) if h == genesis.state_hash => {}
        Ok(_) => return ChainValidation::fail(0, "genesis stateHash mismatch on replay"),
        Err(e) => return ChainValidation::fail(0, format!("replay hashing: {e}")),
    }

    for block in &blocks[1..] {
        let tick = block.command.tick;
        let from_tick = state.last_tick_processed;
        if systems::process_tick_range(&mut state, from_tick, tick).is_err() {
            return ChainValidation::fail(block.index, "replay tick processing failed");
        }
        let outcome = command::execute(&mut state, &block.command);
        if !outcome.success {
            // Buyer-side trade acceptances mutate state from a shared-board
            // offer that does not exist in the buyer's own state; they cannot
            // be re-derived locally. Replay stops there, structurally valid.
            if matches!(block.command.kind, CommandKind::AcceptTrade { .. }) {
                tracing::debug!(index = block.index, "replay stopped at cross-player trade");
                return ChainValidation::ok();
            }
            return ChainValidation::fail(
                block.index,
                format!("replayed command failed: {}", outcome.message),
            );
        }
        match state_hash(&state) {
            Ok(h) if h == block.state_hash => {}
            Ok(_) => return ChainValidation::fail(block.index, "stateHash mismatch on replay"),
            Err(e) => return ChainValidation::fail(block.index, format!("replay hashing: {e}")),
        }
    }
    ChainValidation::ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
