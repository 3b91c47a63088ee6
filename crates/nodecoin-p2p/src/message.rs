//! Gossip wire format.
//!
//! Every gossiped message is one UTF-8 JSON envelope:
//! `{type, senderId, timestamp, payload}`. The payload shape depends on the
//! type; typed payload structs live here so senders and handlers share one
//! definition.

use serde::{Deserialize, Serialize};

use nodecoin_chain::block::Block;

use crate::P2pError;

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// The five well-known gossip topics.
pub mod topics {
    pub const ANNOUNCE: &str = "announce";
    pub const GAME_STATE: &str = "game-state";
    pub const COMMANDS: &str = "commands";
    pub const TRANSACTIONS: &str = "transactions";
    pub const COMBAT: &str = "combat";

    pub const ALL: [&str; 5] = [ANNOUNCE, GAME_STATE, COMMANDS, TRANSACTIONS, COMBAT];
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Announce,
    ChainBlock,
    ChainRequest,
    ChainResponse,
    GameState,
    Transaction,
    Combat,
}

/// The gossip envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GossipMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender_id: String,
    /// Wall-clock milliseconds at send time.
    pub timestamp: u64,
    pub payload: serde_json::Value,
}

impl GossipMessage {
    pub fn new(
        message_type: MessageType,
        sender_id: &str,
        timestamp: u64,
        payload: impl Serialize,
    ) -> Result<Self, P2pError> {
        Ok(Self {
            message_type,
            sender_id: sender_id.to_owned(),
            timestamp,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Serialize for the wire (UTF-8 JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>, P2pError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse an inbound envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, P2pError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse the payload as a typed structure.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, P2pError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

// ---------------------------------------------------------------------------
// Typed payloads
// ---------------------------------------------------------------------------

/// Periodic presence broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncePayload {
    pub player_id: String,
    pub player_name: String,
    pub era: u8,
    /// The node's `NC…` address.
    pub address: String,
}

/// One freshly-produced chain block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBlockPayload {
    pub block: Block,
}

/// Request for a player's blocks starting at `fromIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRequestPayload {
    pub player_id: String,
    pub from_index: u64,
    pub requester_id: String,
}

/// Answer to a [`ChainRequestPayload`]; only ever served for the sender's
/// own chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponsePayload {
    pub player_id: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Full,
    Changes,
}

/// Shared-world sync payload; `data` is base64 of either a full saved
/// document or a length-prefixed change sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub sync_type: SyncType,
    pub data: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let msg = GossipMessage::new(
            MessageType::Announce,
            "p1",
            1_234,
            AnnouncePayload {
                player_id: "p1".into(),
                player_name: "Alice".into(),
                era: 2,
                address: "NC00".into(),
            },
        )
        .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(v["type"], "announce");
        assert_eq!(v["senderId"], "p1");
        assert_eq!(v["timestamp"], 1_234);
        assert_eq!(v["payload"]["playerName"], "Alice");
    }

    #[test]
    fn envelope_round_trip() {
        let msg = GossipMessage::new(
            MessageType::ChainRequest,
            "p2",
            99,
            ChainRequestPayload {
                player_id: "p1".into(),
                from_index: 3,
                requester_id: "p2".into(),
            },
        )
        .unwrap();
        let back = GossipMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(back, msg);
        let payload: ChainRequestPayload = back.parse_payload().unwrap();
        assert_eq!(payload.from_index, 3);
    }

    #[test]
    fn message_types_are_kebab_case() {
        assert_eq!(
            serde_json::to_value(MessageType::ChainBlock).unwrap(),
            serde_json::json!("chain-block")
        );
        assert_eq!(
            serde_json::to_value(MessageType::GameState).unwrap(),
            serde_json::json!("game-state")
        );
    }

    #[test]
    fn malformed_envelope_is_an_error() {
        assert!(GossipMessage::from_bytes(b"not json").is_err());
    }
}
