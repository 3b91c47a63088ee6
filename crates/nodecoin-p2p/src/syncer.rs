//! Shared-world state synchronisation over gossip.
//!
//! Periodically (and on every new peer connection) the syncer publishes the
//! shared document on the `game-state` topic: the first broadcast (or an
//! explicit snapshot push) carries the FULL saved document, later ones carry
//! only the changes since the last broadcast heads.
//!
//! Inbound `full` payloads are never raw-merged -- two independent peers
//! share no automerge ancestry, and a raw merge of unrelated histories is
//! unsound. They go through the replay-signed rebuild instead. Inbound
//! `changes` payloads apply directly; automerge parks changes whose
//! dependencies have not arrived yet.
//!
//! Wire framing: `data` is base64; for `changes` it decodes to a sequence of
//! `[4-byte big-endian length][change bytes]` frames.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;

use nodecoin_world::signed::rebuild_from_remote;
use nodecoin_world::{ChangeHash, WorldDoc};

use crate::bus::GossipBus;
use crate::message::{topics, GossipMessage, MessageType, SyncPayload, SyncType};

/// Default interval between periodic state broadcasts (milliseconds).
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// Change framing
// ---------------------------------------------------------------------------

/// Frame change blobs as `[u32 BE length][bytes]…`.
pub fn encode_change_frames(blobs: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = blobs.iter().map(|b| 4 + b.len()).sum();
    let mut out = Vec::with_capacity(total);
    for blob in blobs {
        out.extend_from_slice(&(blob.len() as u32).to_be_bytes());
        out.extend_from_slice(blob);
    }
    out
}

/// Parse `[u32 BE length][bytes]…` back into blobs. `None` on malformed
/// framing (truncated length or body).
pub fn decode_change_frames(data: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut blobs = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        rest = &rest[4..];
        if rest.len() < len {
            return None;
        }
        blobs.push(rest[..len].to_vec());
        rest = &rest[len..];
    }
    Some(blobs)
}

// ---------------------------------------------------------------------------
// StateSyncer
// ---------------------------------------------------------------------------

pub struct StateSyncer {
    local_player_id: String,
    doc: Arc<Mutex<WorldDoc>>,
    bus: Arc<dyn GossipBus>,
    /// Heads at the last broadcast; `None` until the first one.
    last_heads: Mutex<Option<Vec<ChangeHash>>>,
}

impl StateSyncer {
    pub fn new(local_player_id: &str, doc: Arc<Mutex<WorldDoc>>, bus: Arc<dyn GossipBus>) -> Self {
        Self {
            local_player_id: local_player_id.to_owned(),
            doc,
            bus,
            last_heads: Mutex::new(None),
        }
    }

    /// Shared handle to the document, for the controller's derived writes.
    pub fn doc(&self) -> Arc<Mutex<WorldDoc>> {
        Arc::clone(&self.doc)
    }

    /// Periodic broadcast: full on first call, incremental afterwards.
    /// Publishes nothing when there are no new changes.
    pub fn broadcast(&self, now: u64) {
        let is_first = self.last_heads.lock().is_none();
        if is_first {
            self.broadcast_full(now);
            return;
        }
        let (blobs, heads) = {
            let mut doc = self.doc.lock();
            let since = self
                .last_heads
                .lock()
                .clone()
                .unwrap_or_default();
            let blobs = doc.changes_since(&since);
            let heads = doc.heads();
            (blobs, heads)
        };
        if blobs.is_empty() {
            return;
        }
        let payload = SyncPayload {
            sync_type: SyncType::Changes,
            data: BASE64.encode(encode_change_frames(&blobs)),
        };
        self.publish(payload, now);
        *self.last_heads.lock() = Some(heads);
    }

    /// Push the full document (first broadcast, new peer connect).
    pub fn broadcast_full(&self, now: u64) {
        let (bytes, heads) = {
            let mut doc = self.doc.lock();
            (doc.save(), doc.heads())
        };
        let payload = SyncPayload {
            sync_type: SyncType::Full,
            data: BASE64.encode(bytes),
        };
        self.publish(payload, now);
        *self.last_heads.lock() = Some(heads);
    }

    fn publish(&self, payload: SyncPayload, now: u64) {
        let message = match GossipMessage::new(
            MessageType::GameState,
            &self.local_player_id,
            now,
            payload,
        ) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode sync payload");
                return;
            }
        };
        if let Err(e) = self.bus.publish(topics::GAME_STATE, &message) {
            tracing::warn!(error = %e, "state broadcast failed");
        }
    }

    /// Entry point for every message on the `game-state` topic.
    pub fn handle_message(&self, message: &GossipMessage) {
        if message.sender_id == self.local_player_id {
            return;
        }
        let payload: SyncPayload = match message.parse_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "malformed sync payload");
                return;
            }
        };
        let Ok(data) = BASE64.decode(payload.data.as_bytes()) else {
            tracing::debug!(sender = %message.sender_id, "sync payload is not base64");
            return;
        };
        match payload.sync_type {
            SyncType::Full => self.ingest_full(&message.sender_id, &data),
            SyncType::Changes => self.ingest_changes(&message.sender_id, &data),
        }
    }

    fn ingest_full(&self, sender: &str, data: &[u8]) {
        let mut remote = match WorldDoc::load(data) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(sender = %sender, error = %e, "unloadable full document");
                return;
            }
        };
        let mut local = self.doc.lock();
        match rebuild_from_remote(&mut local, &mut remote) {
            Ok(fresh) => {
                *local = fresh;
                tracing::debug!(sender = %sender, "shared world rebuilt from full payload");
            }
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "full-document rebuild failed");
            }
        }
    }

    fn ingest_changes(&self, sender: &str, data: &[u8]) {
        let Some(blobs) = decode_change_frames(data) else {
            tracing::debug!(sender = %sender, "malformed change framing");
            return;
        };
        let mut doc = self.doc.lock();
        match doc.apply_encoded_changes(&blobs) {
            Ok(applied) => {
                tracing::trace!(sender = %sender, applied, "applied remote changes")
            }
            Err(e) => {
                tracing::debug!(sender = %sender, error = %e, "dropping undecodable changes")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
