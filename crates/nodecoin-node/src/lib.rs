//! Nodecoin Node -- the controller, the agent tool surface, and the
//! launcher glue.
//!
//! A node is one process owning one settlement. This crate assembles the
//! lower layers: the engine's pure simulation, the signed chain, SQLite
//! persistence, the shared world document, and the gossip coordinator, all
//! behind the [`controller::GameController`]'s single critical section.

#![deny(unsafe_code)]

use std::sync::Arc;

use nodecoin_p2p::dispatcher::dispatch_remote_block;
use nodecoin_p2p::P2pCoordinator;

pub mod config;
pub mod controller;
pub mod tools;

pub use controller::GameController;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by the node layer. Per the error policy these are all
/// fatal-class: domain failures travel as `CommandOutcome` values instead.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("engine: {0}")]
    Engine(#[from] nodecoin_engine::EngineError),

    #[error("chain: {0}")]
    Chain(#[from] nodecoin_chain::ChainError),

    #[error("store: {0}")]
    Store(#[from] nodecoin_store::StoreError),

    #[error("world: {0}")]
    World(#[from] nodecoin_world::WorldError),

    #[error("p2p: {0}")]
    P2p(#[from] nodecoin_p2p::P2pError),

    #[error("identity: {0}")]
    Identity(String),
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Connect a controller to its coordinator: attach the network handle and
/// route accepted remote blocks into the remote-action dispatcher.
pub fn wire_network(controller: &Arc<GameController>, coordinator: &Arc<P2pCoordinator>) {
    controller.set_network(Arc::clone(coordinator));
    let hooks = Arc::clone(controller);
    coordinator.set_remote_block_callback(Arc::new(move |block| {
        let outcome = dispatch_remote_block(block, hooks.as_ref());
        tracing::debug!(
            player = %block.player_id,
            index = block.index,
            ?outcome,
            "remote block dispatched"
        );
    }));
}
