//! End-to-end scenarios through the controller: the full envelope of
//! catch-up, handler execution, persistence, and chain recording.

mod common;

use common::{spawn_node, START_MS};

use nodecoin_engine::content::{Biome, ResourceKind};
use nodecoin_engine::state::TradeStatus;
use nodecoin_p2p::MemoryHub;

// -- 1. Build + deduct --------------------------------------------------------

#[test]
fn build_deducts_and_records_a_block() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    let outcome = node.controller.build("choza").unwrap();
    assert!(outcome.success, "{}", outcome.message);

    let state = node.controller.player_state().unwrap();
    assert_eq!(state.resource(ResourceKind::Wood), 80);
    assert_eq!(state.resource(ResourceKind::Food), 90);
    let choza = state.building("choza").unwrap();
    assert_eq!(choza.level, 1);
    assert_eq!(choza.construction_ticks_remaining, 3);

    // Genesis + one command.
    let status = node.controller.chain_status();
    assert_eq!(status.length, 2);
    assert_eq!(status.latest_index, 1);
}

// -- 2. Upgrade under construction fails ---------------------------------------

#[test]
fn upgrade_under_construction_fails_cleanly() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    assert!(node.controller.build("choza").unwrap().success);
    let outcome = node.controller.upgrade("choza").unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("still under construction"));

    // Failed commands record nothing.
    assert_eq!(node.controller.chain_status().length, 2);
}

#[test]
fn construction_finishes_after_three_ticks() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);
    assert!(node.controller.build("choza").unwrap().success);

    node.advance_ticks(3);
    let state = node.controller.player_state().unwrap();
    assert!(state.building("choza").unwrap().is_completed());

    // Now the upgrade goes through.
    let outcome = node.controller.upgrade("choza").unwrap();
    assert!(outcome.success, "{}", outcome.message);
}

// -- 3. Trade escrow and refund ---------------------------------------------------

#[test]
fn trade_escrow_and_cancel_refund() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "T", Biome::Forest, &hub);

    let outcome = node
        .controller
        .create_trade_offer(
            [(ResourceKind::Wood, 40)].into_iter().collect(),
            [(ResourceKind::Iron, 10)].into_iter().collect(),
            Some(50),
        )
        .unwrap();
    assert!(outcome.success);
    let offer_id = outcome.data.unwrap()["offerId"]
        .as_str()
        .unwrap()
        .to_owned();

    let state = node.controller.player_state().unwrap();
    assert_eq!(state.resource(ResourceKind::Wood), 60);

    let outcome = node.controller.cancel_trade_offer(&offer_id).unwrap();
    assert!(outcome.success);

    let state = node.controller.player_state().unwrap();
    assert_eq!(state.resource(ResourceKind::Wood), 100);
    assert_eq!(state.trade_offers.len(), 1);
    assert_eq!(state.trade_offers[0].status, TradeStatus::Cancelled);
}

// -- 4. Chain integrity across the whole session -----------------------------------

#[test]
fn session_chain_verifies_with_replay() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    assert!(node.controller.build("choza").unwrap().success);
    assert!(node.controller.explore("bosque-norte").unwrap().success);
    node.advance_ticks(5);
    assert!(node.controller.claim("bosque-norte").unwrap().success);
    // Food has been eaten down by upkeep at this point; herramientas costs
    // wood and stone only.
    assert!(node.controller.start_research("herramientas").unwrap().success);

    let validation = node.controller.verify_chain();
    assert!(validation.valid, "{:?}", validation.error);
    assert_eq!(node.controller.chain_status().length, 5);

    let blocks = node.controller.chain_blocks(10);
    assert_eq!(blocks.len(), 5);
    assert_eq!(blocks[0].index, 0);
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].hash);
    }
}

// -- 5. Catch-up and mining ----------------------------------------------------------

#[test]
fn catch_up_processes_pending_ticks_and_mines() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    let before = node.controller.player_state().unwrap();
    node.advance_ticks(10);
    let after = node.controller.player_state().unwrap();

    assert_eq!(after.last_tick_processed, 10);
    // Mining paid out every tick.
    assert!(after.tokens > before.tokens);

    // A second catch-up with no elapsed time is a no-op.
    assert_eq!(node.controller.catch_up_ticks().unwrap(), 0);
}

// -- 6. Persistence resume ------------------------------------------------------------

#[test]
fn node_resumes_from_persistence() {
    use nodecoin_chain::keys::PlayerKeypair;
    use nodecoin_node::GameController;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);
    assert!(node.controller.build("choza").unwrap().success);
    node.advance_ticks(4);
    let before = node.controller.player_state().unwrap();
    node.controller.persist().unwrap();

    // Reopen a controller over the same store.
    let clock = Arc::new(AtomicU64::new(node.now()));
    let now_fn: Arc<dyn Fn() -> u64 + Send + Sync> = {
        let clock = Arc::clone(&clock);
        Arc::new(move || clock.load(Ordering::SeqCst))
    };
    let reopened = GameController::open(
        "p1",
        "Test",
        Biome::Forest,
        "p1",
        PlayerKeypair::from_seed("p1"),
        Arc::clone(&node.store),
        node.controller.world(),
        now_fn,
    )
    .unwrap();

    let resumed = reopened.player_state().unwrap();
    assert_eq!(resumed, before);
    assert_eq!(reopened.chain_status().length, 2);
    assert!(reopened.verify_chain().valid);
}

// -- 7. Derived shared-world publications ------------------------------------------------

#[test]
fn commands_publish_rankings_and_zones() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    assert!(node.controller.explore("tundra").unwrap().success);
    assert!(node.controller.claim("tundra").unwrap().success);

    let mut doc = node.doc.lock();
    let rankings = doc.rankings().unwrap();
    assert!(rankings.contains_key("p1"));
    assert_eq!(rankings["p1"].name, "Test");
    // Derived writes are signed by our key.
    assert_eq!(
        rankings["p1"].signed_by,
        node.controller.public_key_hex()
    );

    let zone = doc.zone("tundra").unwrap().unwrap();
    assert!(zone.discovered_by.contains("p1"));
    assert_eq!(zone.claimed_by.as_deref(), Some("p1"));
}

// -- 8. Tool surface ------------------------------------------------------------------------

#[test]
fn tools_route_to_the_controller() {
    use nodecoin_node::tools::{invoke_tool, tool_definitions};

    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    assert_eq!(tool_definitions().len(), 34);

    let response = invoke_tool(
        &node.controller,
        "game_build",
        &serde_json::json!({ "buildingId": "choza" }),
    );
    assert!(!response.is_error, "{}", response.text);

    // A domain failure surfaces as an error text, not a crash.
    let response = invoke_tool(
        &node.controller,
        "game_build",
        &serde_json::json!({ "buildingId": "choza" }),
    );
    assert!(response.is_error);
    assert!(response.text.contains("already built"));

    let response = invoke_tool(&node.controller, "game_status", &serde_json::json!({}));
    assert!(!response.is_error);
    assert!(response.text.contains("\"era\": 1"));

    let response = invoke_tool(&node.controller, "game_nonsense", &serde_json::json!({}));
    assert!(response.is_error);
}

// -- 9. Clock sanity ---------------------------------------------------------------------------

#[test]
fn commands_are_stamped_with_the_current_tick() {
    let hub = MemoryHub::new();
    let node = spawn_node("p1", "Test", Biome::Forest, &hub);

    node.advance_ticks(7);
    assert!(node.controller.explore("cienaga").unwrap().success);

    let blocks = node.controller.chain_blocks(1);
    assert_eq!(blocks[0].command.tick, 7);
    assert!(blocks[0].timestamp >= START_MS);
}
