//! Node entry point.
//!
//! Wires the layers together and drives the periodic work: tick catch-up,
//! shared-world broadcasts, and presence announces. Shutdown is cooperative:
//! stop the timers, unsubscribe, flush persistence.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use nodecoin_chain::keys::PlayerKeypair;
use nodecoin_node::config::NodeConfig;
use nodecoin_node::{wire_network, GameController};
use nodecoin_p2p::{GossipBus, LocalIdentity, MemoryHub, P2pCoordinator};
use nodecoin_store::peers::PEER_MAX_AGE_MS;
use nodecoin_store::Store;
use nodecoin_world::WorldDoc;

/// How often pending ticks are drained.
const TICK_DRIVE_INTERVAL: Duration = Duration::from_secs(1);
/// How often the shared world is broadcast.
const STATE_BROADCAST_INTERVAL: Duration = Duration::from_millis(5_000);
/// How often presence is announced.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
/// How often the shared world is flushed to disk.
const WORLD_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Load or create the node's Ed25519 identity under the data dir.
fn load_identity(data_dir: &Path, seed: Option<&str>) -> Result<PlayerKeypair> {
    if let Some(seed) = seed {
        return Ok(PlayerKeypair::from_seed(seed));
    }
    let key_path = data_dir.join("identity.key");
    if key_path.exists() {
        let hex_key = fs::read_to_string(&key_path).context("reading identity.key")?;
        let bytes = hex::decode(hex_key.trim()).context("identity.key is not hex")?;
        return PlayerKeypair::from_secret_bytes(&bytes).context("identity.key is malformed");
    }
    let keypair = PlayerKeypair::generate();
    fs::write(&key_path, hex::encode(keypair.secret_bytes()))
        .context("writing identity.key")?;
    tracing::info!(path = %key_path.display(), "generated new node identity");
    Ok(keypair)
}

/// Load the shared world from disk, or start fresh.
fn load_world(data_dir: &Path) -> Result<WorldDoc> {
    let world_path = data_dir.join("world.am");
    if world_path.exists() {
        let bytes = fs::read(&world_path).context("reading world.am")?;
        match WorldDoc::load(&bytes) {
            Ok(doc) => return Ok(doc),
            Err(e) => {
                tracing::warn!(error = %e, "world.am unreadable, starting fresh");
            }
        }
    }
    Ok(WorldDoc::new()?)
}

fn flush_world(data_dir: &Path, doc: &Arc<Mutex<WorldDoc>>) {
    let bytes = doc.lock().save();
    if let Err(e) = fs::write(data_dir.join("world.am"), bytes) {
        tracing::warn!(error = %e, "flushing world.am failed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::parse();
    fs::create_dir_all(&config.data_dir).context("creating data dir")?;

    let keypair = load_identity(&config.data_dir, config.seed.as_deref())?;
    let address = keypair.address();
    let player_id = config.id.clone().unwrap_or_else(|| address.clone());
    let seed = config.seed.clone().unwrap_or_else(|| player_id.clone());

    let store = Store::open(&config.data_dir.join("node.db")).context("opening store")?;
    let pruned = store.prune_peers(now_ms(), PEER_MAX_AGE_MS)?;
    if pruned > 0 {
        tracing::info!(pruned, "pruned stale known peers");
    }
    let store = Arc::new(Mutex::new(store));
    let doc = Arc::new(Mutex::new(load_world(&config.data_dir)?));

    let controller = Arc::new(
        GameController::open(
            &player_id,
            &config.name,
            config.biome,
            &seed,
            keypair,
            Arc::clone(&store),
            Arc::clone(&doc),
            Arc::new(now_ms),
        )
        .context("opening controller")?,
    );
    tracing::info!(
        player = %player_id,
        name = %config.name,
        biome = %config.biome,
        %address,
        "nodecoin node up"
    );

    let coordinator = if config.no_p2p {
        None
    } else {
        // The concrete transport binds beneath the gossip bus; in-process
        // the hub stands in for it. Bootstrap addresses are recorded as
        // reconnection hints for the transport layer.
        let bus: Arc<dyn GossipBus> = MemoryHub::new();
        let coordinator = P2pCoordinator::new(
            LocalIdentity {
                player_id: player_id.clone(),
                player_name: config.name.clone(),
                address: address.clone(),
            },
            bus,
            Arc::clone(&store),
            Arc::clone(&doc),
            Arc::new(now_ms),
        );
        wire_network(&controller, &coordinator);
        coordinator.start(now_ms());
        for multiaddr in &config.bootstrap {
            coordinator.on_peer_connected(multiaddr, multiaddr, now_ms());
        }
        tracing::info!(port = config.port, peers = config.bootstrap.len(), "p2p enabled");
        Some(coordinator)
    };

    // Periodic drivers.
    let tick_controller = Arc::clone(&controller);
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_DRIVE_INTERVAL);
        loop {
            interval.tick().await;
            match tick_controller.catch_up_ticks() {
                Ok(0) => {}
                Ok(n) => tracing::debug!(ticks = n, "processed pending ticks"),
                Err(e) => {
                    tracing::error!(error = %e, "tick processing failed fatally");
                    break;
                }
            }
        }
    });

    let broadcast_task = coordinator.clone().map(|coordinator| {
        tokio::spawn(async move {
            let mut state_interval = tokio::time::interval(STATE_BROADCAST_INTERVAL);
            let mut announce_interval = tokio::time::interval(ANNOUNCE_INTERVAL);
            loop {
                tokio::select! {
                    _ = state_interval.tick() => coordinator.broadcast_state(now_ms()),
                    _ = announce_interval.tick() => coordinator.publish_announce(now_ms()),
                }
            }
        })
    });

    let flush_doc = Arc::clone(&doc);
    let flush_dir = config.data_dir.clone();
    let flush_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(WORLD_FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            flush_world(&flush_dir, &flush_doc);
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");

    tick_task.abort();
    if let Some(task) = broadcast_task {
        task.abort();
    }
    flush_task.abort();
    controller.shutdown().context("controller shutdown")?;
    flush_world(&config.data_dir, &doc);
    Ok(())
}
