//! The P2P coordinator: wiring between the bus, the broadcaster, the state
//! syncer, and the peer registry.
//!
//! On a new peer connection the coordinator (i) saves the dialled multiaddr
//! to the known-peers table, (ii) publishes an `announce`, (iii) pushes the
//! current full shared document, and (iv) requests the peer's command chain
//! from index zero. Announces from previously-unknown players also trigger a
//! chain request, so late joiners converge without a direct dial.

use std::sync::Arc;

use parking_lot::Mutex;

use nodecoin_chain::block::Block;
use nodecoin_store::Store;
use nodecoin_world::WorldDoc;

use crate::broadcaster::{ChainBroadcaster, RemoteBlockCallback};
use crate::bus::{GossipBus, SubscriptionId};
use crate::message::{topics, AnnouncePayload, GossipMessage, MessageType};
use crate::registry::PeerRegistry;
use crate::syncer::StateSyncer;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// What the coordinator announces about the local node.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub player_id: String,
    pub player_name: String,
    pub address: String,
}

// ---------------------------------------------------------------------------
// P2pCoordinator
// ---------------------------------------------------------------------------

/// Source of wall-clock milliseconds, injected so handlers are testable.
pub type ClockFn = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct P2pCoordinator {
    identity: LocalIdentity,
    bus: Arc<dyn GossipBus>,
    store: Arc<Mutex<Store>>,
    broadcaster: Arc<ChainBroadcaster>,
    syncer: Arc<StateSyncer>,
    registry: Arc<PeerRegistry>,
    now_fn: ClockFn,
    /// Current era, refreshed by the controller for announces.
    era: Mutex<u8>,
    subscriptions: Mutex<Vec<(&'static str, SubscriptionId)>>,
}

impl P2pCoordinator {
    pub fn new(
        identity: LocalIdentity,
        bus: Arc<dyn GossipBus>,
        store: Arc<Mutex<Store>>,
        doc: Arc<Mutex<WorldDoc>>,
        now_fn: ClockFn,
    ) -> Arc<Self> {
        let broadcaster = Arc::new(ChainBroadcaster::new(
            &identity.player_id,
            Arc::clone(&store),
            Arc::clone(&bus),
        ));
        let syncer = Arc::new(StateSyncer::new(
            &identity.player_id,
            doc,
            Arc::clone(&bus),
        ));
        Arc::new(Self {
            identity,
            bus,
            store,
            broadcaster,
            syncer,
            registry: Arc::new(PeerRegistry::new()),
            now_fn,
            era: Mutex::new(1),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to the gossip topics. Call once at startup.
    pub fn start(self: &Arc<Self>, now: u64) {
        let mut subs = self.subscriptions.lock();

        let this = Arc::clone(self);
        subs.push((
            topics::COMMANDS,
            self.bus.subscribe(
                topics::COMMANDS,
                Arc::new(move |_, msg| {
                    let now = (this.now_fn)();
                    this.broadcaster.handle_message(msg, now);
                }),
            ),
        ));

        let this = Arc::clone(self);
        subs.push((
            topics::GAME_STATE,
            self.bus.subscribe(
                topics::GAME_STATE,
                Arc::new(move |_, msg| this.syncer.handle_message(msg)),
            ),
        ));

        let this = Arc::clone(self);
        subs.push((
            topics::ANNOUNCE,
            self.bus.subscribe(
                topics::ANNOUNCE,
                Arc::new(move |_, msg| this.handle_announce(msg)),
            ),
        ));

        drop(subs);
        self.publish_announce(now);
        tracing::info!(player = %self.identity.player_id, "p2p coordinator started");
    }

    /// The broadcaster, for wiring the remote-block callback.
    pub fn broadcaster(&self) -> &ChainBroadcaster {
        &self.broadcaster
    }

    /// The state syncer, for the periodic broadcast driver.
    pub fn syncer(&self) -> &StateSyncer {
        &self.syncer
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Register the callback fired for every accepted remote block.
    pub fn set_remote_block_callback(&self, callback: RemoteBlockCallback) {
        self.broadcaster.set_remote_block_callback(callback);
    }

    /// Keep announces fresh as the settlement advances.
    pub fn set_era(&self, era: u8) {
        *self.era.lock() = era;
    }

    // -- outbound ---------------------------------------------------------------

    /// Broadcast one of our own blocks on the `commands` topic.
    pub fn broadcast_block(&self, block: &Block, now: u64) {
        self.broadcaster.broadcast_block(block, now);
    }

    /// Publish our presence.
    pub fn publish_announce(&self, now: u64) {
        let payload = AnnouncePayload {
            player_id: self.identity.player_id.clone(),
            player_name: self.identity.player_name.clone(),
            era: *self.era.lock(),
            address: self.identity.address.clone(),
        };
        let message = match GossipMessage::new(
            MessageType::Announce,
            &self.identity.player_id,
            now,
            payload,
        ) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode announce");
                return;
            }
        };
        if let Err(e) = self.bus.publish(topics::ANNOUNCE, &message) {
            tracing::warn!(error = %e, "announce publish failed");
        }
    }

    /// Periodic driver hook: incremental (or first full) state broadcast.
    pub fn broadcast_state(&self, now: u64) {
        self.syncer.broadcast(now);
    }

    /// Full connect flow for a freshly-dialled peer.
    pub fn on_peer_connected(&self, multiaddr: &str, peer_id: &str, now: u64) {
        if let Err(e) = self
            .store
            .lock()
            .upsert_peer(multiaddr, peer_id, None, now)
        {
            tracing::warn!(error = %e, "saving known peer failed");
        }
        self.registry.mark_connected(peer_id, multiaddr, now);
        self.publish_announce(now);
        self.syncer.broadcast_full(now);
        self.broadcaster.request_chain_from(peer_id, 0, now);
    }

    /// Cooperative shutdown: drop all subscriptions.
    pub fn shutdown(&self) {
        let mut subs = self.subscriptions.lock();
        for (topic, id) in subs.drain(..) {
            self.bus.unsubscribe(topic, id);
        }
        tracing::info!(player = %self.identity.player_id, "p2p coordinator stopped");
    }

    // -- inbound ------------------------------------------------------------------

    fn handle_announce(&self, message: &GossipMessage) {
        if message.sender_id == self.identity.player_id {
            return;
        }
        let Ok(payload) = message.parse_payload::<AnnouncePayload>() else {
            tracing::debug!(sender = %message.sender_id, "malformed announce");
            return;
        };
        let newly_seen = self.registry.on_announce(
            &payload.player_id,
            &payload.player_name,
            payload.era,
            &payload.address,
            message.timestamp,
        );
        if newly_seen {
            tracing::info!(player = %payload.player_id, name = %payload.player_name, "new player announced");
            // First sight of this player: pull their whole chain.
            self.broadcaster
                .request_chain_from(&payload.player_id, 0, message.timestamp);
        }
    }

}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryHub;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coordinator(id: &str, hub: &Arc<MemoryHub>) -> Arc<P2pCoordinator> {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        let doc = Arc::new(Mutex::new(WorldDoc::new().unwrap()));
        P2pCoordinator::new(
            LocalIdentity {
                player_id: id.to_owned(),
                player_name: format!("Node {id}"),
                address: format!("NC{}", "0".repeat(40)),
            },
            Arc::clone(hub) as Arc<dyn GossipBus>,
            store,
            doc,
            Arc::new(|| 10_000),
        )
    }

    #[test]
    fn start_publishes_announce() {
        let hub = MemoryHub::new();
        let announces = Arc::new(AtomicUsize::new(0));
        {
            let announces = Arc::clone(&announces);
            hub.subscribe(
                topics::ANNOUNCE,
                Arc::new(move |_, msg| {
                    if msg.message_type == MessageType::Announce {
                        announces.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }
        let node = coordinator("a", &hub);
        node.start(1_000);
        assert_eq!(announces.load(Ordering::SeqCst), 1);
        node.shutdown();
    }

    #[test]
    fn announce_registers_peer_and_requests_chain() {
        let hub = MemoryHub::new();
        let node_a = coordinator("a", &hub);
        node_a.start(1_000);

        let requests = Arc::new(AtomicUsize::new(0));
        {
            let requests = Arc::clone(&requests);
            hub.subscribe(
                topics::COMMANDS,
                Arc::new(move |_, msg| {
                    if msg.message_type == MessageType::ChainRequest {
                        requests.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        // A second node starting up announces itself; A hears it.
        let node_b = coordinator("b", &hub);
        node_b.start(2_000);

        assert_eq!(node_a.registry().len(), 1);
        assert_eq!(node_a.registry().get("b").unwrap().player_name, "Node b");
        // First sight of "b" pulls its chain from zero.
        assert!(requests.load(Ordering::SeqCst) >= 1);

        // A repeat announce does not re-request.
        let before = requests.load(Ordering::SeqCst);
        node_b.publish_announce(3_000);
        assert_eq!(requests.load(Ordering::SeqCst), before);

        node_a.shutdown();
        node_b.shutdown();
    }

    #[test]
    fn peer_connect_flow_persists_and_pushes() {
        let hub = MemoryHub::new();
        let node = coordinator("a", &hub);
        node.start(1_000);

        let full_pushes = Arc::new(AtomicUsize::new(0));
        {
            let full_pushes = Arc::clone(&full_pushes);
            hub.subscribe(
                topics::GAME_STATE,
                Arc::new(move |_, msg| {
                    if msg.message_type == MessageType::GameState {
                        full_pushes.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }

        node.on_peer_connected("/ip4/10.0.0.9/tcp/7000", "b", 5_000);
        assert_eq!(full_pushes.load(Ordering::SeqCst), 1);
        assert_eq!(node.registry().len(), 1);
        node.shutdown();
    }

    #[test]
    fn shutdown_unsubscribes() {
        let hub = MemoryHub::new();
        let node_a = coordinator("a", &hub);
        node_a.start(1_000);
        node_a.shutdown();

        // After shutdown, announces from others no longer register.
        let node_b = coordinator("b", &hub);
        node_b.start(2_000);
        assert_eq!(node_a.registry().len(), 0);
        node_b.shutdown();
    }
}
