//! Nodecoin World -- the replicated shared-world document.
//!
//! Every node gossips a CRDT document aggregating what the whole network can
//! observe: rankings, zone discoveries and claims, the trade board, alliance
//! membership, and a rolling combat feed. Entries that assert something on a
//! player's behalf (rankings, trade offers, alliances) are signed by that
//! player and verified before they are folded into the local document;
//! unsigned entries (zones, combat logs) are informational and merely
//! validated structurally.
//!
//! Map entries resolve last-writer-wins per key, which is exactly the
//! automerge map semantics. Full-document payloads from other peers are never
//! raw-merged -- see [`signed::rebuild_from_remote`] for why.

#![deny(unsafe_code)]

pub mod doc;
pub mod entries;
pub mod signed;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by shared-world operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("automerge: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    #[error("malformed change blob: {0}")]
    MalformedChange(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("signing: {0}")]
    Signing(String),
}

pub use automerge::ChangeHash;
pub use doc::WorldDoc;
pub use entries::{AllianceEntry, CombatLogEntry, RankingEntry, TradeOfferEntry, ZoneEntry};
