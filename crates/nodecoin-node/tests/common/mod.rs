//! Shared scaffolding for the node integration tests: an in-process node
//! with a controllable clock, wired to a shared memory hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use nodecoin_chain::keys::PlayerKeypair;
use nodecoin_engine::clock::DEFAULT_TICK_DURATION_MS;
use nodecoin_engine::content::Biome;
use nodecoin_node::{wire_network, GameController};
use nodecoin_p2p::{GossipBus, LocalIdentity, MemoryHub, P2pCoordinator};
use nodecoin_store::Store;
use nodecoin_world::WorldDoc;

/// Wall-clock origin for tests; any fixed epoch works.
pub const START_MS: u64 = 1_000_000;

pub struct TestNode {
    pub controller: Arc<GameController>,
    pub coordinator: Arc<P2pCoordinator>,
    pub clock: Arc<AtomicU64>,
    pub store: Arc<Mutex<Store>>,
    pub doc: Arc<Mutex<WorldDoc>>,
}

impl TestNode {
    /// Advance wall-clock by whole ticks and drain them.
    pub fn advance_ticks(&self, ticks: u64) {
        self.clock
            .fetch_add(ticks * DEFAULT_TICK_DURATION_MS, Ordering::SeqCst);
        self.controller.catch_up_ticks().expect("tick processing");
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }
}

/// Spin up a full node on the given hub.
pub fn spawn_node(id: &str, name: &str, biome: Biome, hub: &Arc<MemoryHub>) -> TestNode {
    let clock = Arc::new(AtomicU64::new(START_MS));
    let now_fn: Arc<dyn Fn() -> u64 + Send + Sync> = {
        let clock = Arc::clone(&clock);
        Arc::new(move || clock.load(Ordering::SeqCst))
    };

    let store = Arc::new(Mutex::new(Store::open_in_memory().expect("store")));
    let doc = Arc::new(Mutex::new(WorldDoc::new().expect("world doc")));
    let keypair = PlayerKeypair::from_seed(id);

    let controller = Arc::new(
        GameController::open(
            id,
            name,
            biome,
            id,
            keypair,
            Arc::clone(&store),
            Arc::clone(&doc),
            Arc::clone(&now_fn),
        )
        .expect("controller"),
    );

    let coordinator = P2pCoordinator::new(
        LocalIdentity {
            player_id: id.to_owned(),
            player_name: name.to_owned(),
            address: controller.address(),
        },
        Arc::clone(hub) as Arc<dyn GossipBus>,
        Arc::clone(&store),
        Arc::clone(&doc),
        Arc::clone(&now_fn),
    );
    wire_network(&controller, &coordinator);
    coordinator.start(START_MS);

    TestNode {
        controller,
        coordinator,
        clock,
        store,
        doc,
    }
}
