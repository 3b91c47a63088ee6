//! Nodecoin P2P -- topic-based gossip coordination.
//!
//! The coordinator abstracts the transport behind a [`bus::GossipBus`] trait;
//! everything above it -- the chain broadcaster with its verification
//! pipeline, the shared-world state syncer, and the remote-action dispatcher
//! -- is transport-agnostic and tested against the in-memory hub.
//!
//! Error policy: everything arriving from the network is untrusted. A block
//! or payload that fails any check is dropped (optionally answered with a
//! `ChainRequest`), logged at debug level, and never escalates into a local
//! error.

#![deny(unsafe_code)]

pub mod broadcaster;
pub mod bus;
pub mod coordinator;
pub mod dispatcher;
pub mod message;
pub mod ratelimit;
pub mod registry;
pub mod syncer;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by p2p operations on the LOCAL side (serialization,
/// persistence). Remote misbehavior is never an error, only a drop.
#[derive(Debug, thiserror::Error)]
pub enum P2pError {
    #[error("message encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(#[from] nodecoin_store::StoreError),

    #[error("world: {0}")]
    World(#[from] nodecoin_world::WorldError),

    #[error("chain: {0}")]
    Chain(#[from] nodecoin_chain::ChainError),
}

pub use bus::{GossipBus, GossipHandler, MemoryHub, SubscriptionId};
pub use coordinator::{ClockFn, LocalIdentity, P2pCoordinator};
pub use message::{topics, GossipMessage, MessageType};
