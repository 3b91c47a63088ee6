//! The chain broadcaster: inbound block verification and chain repair.
//!
//! Every inbound `CommandBlock` runs one fixed pipeline:
//!
//! 1. self-filter, 2. per-sender rate limit (before any signature work),
//! 3. clock-skew bound, 4. hash recomputation, 5. signature verification,
//! 6. identity binding (public key pinned at genesis), 7. idempotency,
//! 8. linkage (gaps answered with a `ChainRequest`), 9. persist + notify.
//!
//! `ChainRequest` is answered only for OUR OWN chain -- each player is the
//! authoritative source for their chain. `ChainResponse` re-runs the same
//! pipeline per block, skipping blocks we already have.
//!
//! Per remote player the broadcaster tracks a small state machine:
//! `Unknown -> HaveGenesis -> UpToDate(len) <-> Lagging`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use nodecoin_chain::block::Block;
use nodecoin_store::Store;

use crate::bus::GossipBus;
use crate::message::{
    topics, ChainBlockPayload, ChainRequestPayload, ChainResponsePayload, GossipMessage,
    MessageType,
};
use crate::ratelimit::RateLimiter;

/// Maximum tolerated clock skew on inbound block timestamps.
pub const MAX_CLOCK_SKEW_MS: u64 = 5 * 60_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sync state for one remote player's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChainStatus {
    Unknown,
    HaveGenesis,
    UpToDate(u64),
    Lagging,
}

/// What happened to one inbound block. Surfaced for tests and tracing; none
/// of these escalate into errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockDisposition {
    Accepted,
    Duplicate,
    RateLimited,
    /// A gap was detected and a `ChainRequest` went out.
    GapRequested,
    Rejected(String),
    Ignored,
}

/// Callback invoked with every accepted remote block.
pub type RemoteBlockCallback = Arc<dyn Fn(&Block) + Send + Sync>;

// ---------------------------------------------------------------------------
// ChainBroadcaster
// ---------------------------------------------------------------------------

pub struct ChainBroadcaster {
    local_player_id: String,
    store: Arc<Mutex<Store>>,
    bus: Arc<dyn GossipBus>,
    limiter: RateLimiter,
    /// Public key pinned per remote player, established at genesis.
    identities: Mutex<HashMap<String, String>>,
    statuses: Mutex<HashMap<String, RemoteChainStatus>>,
    on_accepted: Mutex<Option<RemoteBlockCallback>>,
}

impl ChainBroadcaster {
    pub fn new(local_player_id: &str, store: Arc<Mutex<Store>>, bus: Arc<dyn GossipBus>) -> Self {
        Self {
            local_player_id: local_player_id.to_owned(),
            store,
            bus,
            limiter: RateLimiter::default(),
            identities: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            on_accepted: Mutex::new(None),
        }
    }

    /// Register the callback fired for every accepted remote block.
    pub fn set_remote_block_callback(&self, callback: RemoteBlockCallback) {
        *self.on_accepted.lock() = Some(callback);
    }

    /// The sync status of a remote player's chain.
    pub fn status(&self, player_id: &str) -> RemoteChainStatus {
        self.statuses
            .lock()
            .get(player_id)
            .copied()
            .unwrap_or(RemoteChainStatus::Unknown)
    }

    /// Broadcast one of our own freshly-appended blocks.
    pub fn broadcast_block(&self, block: &Block, now: u64) {
        let message = match GossipMessage::new(
            MessageType::ChainBlock,
            &self.local_player_id,
            now,
            ChainBlockPayload {
                block: block.clone(),
            },
        ) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode own block");
                return;
            }
        };
        if let Err(e) = self.bus.publish(topics::COMMANDS, &message) {
            tracing::warn!(error = %e, "block broadcast failed");
        }
    }

    /// Entry point for every message on the `commands` topic.
    pub fn handle_message(&self, message: &GossipMessage, now: u64) {
        if message.sender_id == self.local_player_id {
            return;
        }
        match message.message_type {
            MessageType::ChainBlock => {
                let payload: ChainBlockPayload = match message.parse_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!(error = %e, "malformed chain-block payload");
                        return;
                    }
                };
                let disposition =
                    self.process_block(&payload.block, &message.sender_id, now, true);
                tracing::debug!(
                    player = %payload.block.player_id,
                    index = payload.block.index,
                    ?disposition,
                    "inbound block"
                );
            }
            MessageType::ChainRequest => {
                if let Ok(payload) = message.parse_payload::<ChainRequestPayload>() {
                    self.handle_chain_request(&payload, now);
                }
            }
            MessageType::ChainResponse => {
                if let Ok(payload) = message.parse_payload::<ChainResponsePayload>() {
                    self.handle_chain_response(&payload, &message.sender_id, now);
                }
            }
            _ => {}
        }
    }

    // -- pipeline -------------------------------------------------------------

    /// Run the full verification pipeline on one block.
    pub fn process_block(
        &self,
        block: &Block,
        sender_id: &str,
        now: u64,
        rate_limit: bool,
    ) -> BlockDisposition {
        // 1. Self-filter.
        if sender_id == self.local_player_id || block.player_id == self.local_player_id {
            return BlockDisposition::Ignored;
        }

        // 2. Rate limit, before any crypto.
        if rate_limit && !self.limiter.allow(sender_id, now) {
            return BlockDisposition::RateLimited;
        }

        // 3. Clock skew.
        if block.timestamp > now + MAX_CLOCK_SKEW_MS {
            return BlockDisposition::Rejected("timestamp too far in the future".into());
        }

        // 4. Hash.
        match block.compute_hash() {
            Ok(recomputed) if recomputed == block.hash => {}
            _ => return BlockDisposition::Rejected("hash mismatch".into()),
        }

        // 5. Signature.
        if !block.verify_signature() {
            return BlockDisposition::Rejected("signature does not verify".into());
        }

        // 6. Identity binding.
        match self.pinned_key(&block.player_id) {
            Some(pinned) if pinned != block.public_key => {
                return BlockDisposition::Rejected("public key differs from pinned identity".into());
            }
            Some(_) => {}
            None if block.index == 0 => {
                self.identities
                    .lock()
                    .insert(block.player_id.clone(), block.public_key.clone());
            }
            None => {
                return BlockDisposition::Rejected("non-genesis block from unknown player".into());
            }
        }

        // 7. Idempotency.
        let (already_have, local_len, local_tip) = {
            let store = self.store.lock();
            let already = store.has_block(&block.hash).unwrap_or(false);
            let len = store.chain_length(&block.player_id).unwrap_or(0);
            let tip = store.latest_block(&block.player_id).ok().flatten();
            (already, len, tip)
        };
        if already_have {
            return BlockDisposition::Duplicate;
        }

        // 8. Linkage.
        if block.index == 0 {
            if local_len > 0 {
                // First-seen genesis wins locally.
                return BlockDisposition::Rejected("conflicting genesis".into());
            }
        } else if block.index == local_len {
            let Some(tip) = local_tip else {
                return self.request_chain(&block.player_id, 0, now);
            };
            if block.prev_hash != tip.hash {
                return self.request_chain(&block.player_id, local_len, now);
            }
        } else if block.index > local_len {
            return self.request_chain(&block.player_id, local_len, now);
        } else {
            return BlockDisposition::Rejected("index behind local chain".into());
        }

        // 9. Persist, track, notify.
        if let Err(e) = self.store.lock().save_block(block) {
            tracing::error!(error = %e, "persisting remote block failed");
            return BlockDisposition::Rejected("persistence failure".into());
        }
        let new_len = local_len + 1;
        let status = if block.index == 0 && new_len == 1 {
            RemoteChainStatus::HaveGenesis
        } else {
            RemoteChainStatus::UpToDate(new_len)
        };
        self.statuses
            .lock()
            .insert(block.player_id.clone(), status);

        let callback = self.on_accepted.lock().clone();
        if let Some(callback) = callback {
            callback(block);
        }
        BlockDisposition::Accepted
    }

    fn pinned_key(&self, player_id: &str) -> Option<String> {
        if let Some(key) = self.identities.lock().get(player_id) {
            return Some(key.clone());
        }
        // Lazily re-pin from a persisted genesis after restart.
        let genesis = {
            let store = self.store.lock();
            store
                .load_block_range(player_id, 0, 1)
                .ok()
                .and_then(|blocks| blocks.into_iter().next())
        };
        genesis.map(|g| {
            self.identities
                .lock()
                .insert(player_id.to_owned(), g.public_key.clone());
            g.public_key
        })
    }

    fn request_chain(&self, player_id: &str, from_index: u64, now: u64) -> BlockDisposition {
        self.statuses
            .lock()
            .insert(player_id.to_owned(), RemoteChainStatus::Lagging);
        let message = match GossipMessage::new(
            MessageType::ChainRequest,
            &self.local_player_id,
            now,
            ChainRequestPayload {
                player_id: player_id.to_owned(),
                from_index,
                requester_id: self.local_player_id.clone(),
            },
        ) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode chain request");
                return BlockDisposition::GapRequested;
            }
        };
        if let Err(e) = self.bus.publish(topics::COMMANDS, &message) {
            tracing::warn!(error = %e, "chain request publish failed");
        }
        BlockDisposition::GapRequested
    }

    // -- requests and responses --------------------------------------------------

    /// Answer a request for OUR chain; silent for anyone else's.
    fn handle_chain_request(&self, payload: &ChainRequestPayload, now: u64) {
        if payload.player_id != self.local_player_id {
            return;
        }
        let blocks = {
            let store = self.store.lock();
            let len = store.chain_length(&self.local_player_id).unwrap_or(0);
            store
                .load_block_range(&self.local_player_id, payload.from_index, len)
                .unwrap_or_default()
        };
        if blocks.is_empty() {
            return;
        }
        tracing::debug!(
            requester = %payload.requester_id,
            from = payload.from_index,
            count = blocks.len(),
            "serving chain response"
        );
        let message = match GossipMessage::new(
            MessageType::ChainResponse,
            &self.local_player_id,
            now,
            ChainResponsePayload {
                player_id: self.local_player_id.clone(),
                blocks,
            },
        ) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode chain response");
                return;
            }
        };
        if let Err(e) = self.bus.publish(topics::COMMANDS, &message) {
            tracing::warn!(error = %e, "chain response publish failed");
        }
    }

    /// Fold a chain response: one rate-limit charge for the envelope, then
    /// the per-block pipeline with known blocks skipped.
    fn handle_chain_response(&self, payload: &ChainResponsePayload, sender_id: &str, now: u64) {
        if !self.limiter.allow(sender_id, now) {
            return;
        }
        for block in &payload.blocks {
            let disposition = self.process_block(block, sender_id, now, false);
            match disposition {
                BlockDisposition::Accepted | BlockDisposition::Duplicate => {}
                other => {
                    tracing::debug!(?other, index = block.index, "chain response block dropped");
                    break;
                }
            }
        }
    }

    /// Ask for a player's chain from an explicit index (used on first sight
    /// of a new player).
    pub fn request_chain_from(&self, player_id: &str, from_index: u64, now: u64) {
        self.request_chain(player_id, from_index, now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
