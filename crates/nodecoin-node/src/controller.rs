//! The node controller: the single owner of all mutable game state.
//!
//! One `GameController` owns one [`PlayerState`], one [`CommandChain`], one
//! persistence handle, and (optionally) one network coordinator, all behind
//! a single mutex. Every state-touching path -- local commands, tick
//! catch-up, remote-action application -- enters that one critical section;
//! handler bodies never block on I/O or the network.
//!
//! The write path for a local command is `execute_and_record`:
//! catch up ticks, run the handler, and on success persist the snapshot and
//! the signed block atomically, broadcast the block, and publish the derived
//! shared-world mutations.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use nodecoin_chain::block::{state_hash, Block};
use nodecoin_chain::chain::{validate_chain_with_replay, ChainValidation, CommandChain};
use nodecoin_chain::keys::PlayerKeypair;
use nodecoin_engine::battle::{self, BattleSide, BattleWinner};
use nodecoin_engine::clock::TickClock;
use nodecoin_engine::command::{execute, CommandKind, CommandOutcome, GameCommand};
use nodecoin_engine::content::{Biome, ResourceKind, UnitKind};
use nodecoin_engine::rng::GameRng;
use nodecoin_engine::state::{DiplomacyStatus, PlayerState, Strategy, TradeStatus};
use nodecoin_engine::systems;
use nodecoin_p2p::dispatcher::RemoteGameHooks;
use nodecoin_p2p::P2pCoordinator;
use nodecoin_store::Store;
use nodecoin_world::entries::{AllianceEntry, CombatLogEntry, RankingEntry, TradeOfferEntry};
use nodecoin_world::signed::sign_entry;
use nodecoin_world::WorldDoc;

use crate::NodeError;

/// Source of wall-clock milliseconds.
pub type ClockFn = Arc<dyn Fn() -> u64 + Send + Sync>;

// ---------------------------------------------------------------------------
// Status types
// ---------------------------------------------------------------------------

/// Summary of the local chain, for the status surface.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    pub player_id: String,
    pub length: u64,
    pub latest_hash: String,
    pub latest_index: u64,
}

// ---------------------------------------------------------------------------
// GameController
// ---------------------------------------------------------------------------

struct Inner {
    state: PlayerState,
    chain: CommandChain,
    network: Option<Arc<P2pCoordinator>>,
}

pub struct GameController {
    player_id: String,
    keypair: PlayerKeypair,
    clock: TickClock,
    now_fn: ClockFn,
    store: Arc<Mutex<Store>>,
    doc: Arc<Mutex<WorldDoc>>,
    inner: Mutex<Inner>,
}

impl GameController {
    /// Open a controller, resuming from persistence when a snapshot and
    /// chain exist, otherwise creating the settlement and its genesis block.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        player_id: &str,
        player_name: &str,
        biome: Biome,
        seed: &str,
        keypair: PlayerKeypair,
        store: Arc<Mutex<Store>>,
        doc: Arc<Mutex<WorldDoc>>,
        now_fn: ClockFn,
    ) -> Result<Self, NodeError> {
        let now = now_fn();
        let (state, chain, clock) = {
            let mut guard = store.lock();
            let snapshot = guard.latest_snapshot(player_id)?;
            let blocks = guard.load_chain(player_id)?;
            match (snapshot, blocks.is_empty()) {
                (Some(snapshot), false) => {
                    let state = PlayerState::deserialize(snapshot.state_json.as_bytes())?;
                    let chain = CommandChain::from_blocks(blocks)?;
                    let clock = TickClock::new(state.created_at);
                    tracing::info!(
                        player = %player_id,
                        tick = state.last_tick_processed,
                        chain_len = chain.len(),
                        "resumed from persistence"
                    );
                    (state, chain, clock)
                }
                _ => {
                    let state = PlayerState::create_new(player_id, player_name, biome, now);
                    let hash = state_hash(&state)?;
                    let chain = CommandChain::genesis(
                        player_id,
                        player_name,
                        biome,
                        seed,
                        &hash,
                        now,
                        &keypair,
                    )?;
                    let state_json = String::from_utf8(state.serialize()?)
                        .map_err(|e| NodeError::Identity(format!("state encoding: {e}")))?;
                    guard.save_command_result(
                        player_id,
                        0,
                        &state_json,
                        &hash,
                        &chain.blocks()[0],
                    )?;
                    tracing::info!(player = %player_id, %biome, "created new settlement");
                    (state, chain, TickClock::new(now))
                }
            }
        };

        Ok(Self {
            player_id: player_id.to_owned(),
            keypair,
            clock,
            now_fn,
            store,
            doc,
            inner: Mutex::new(Inner {
                state,
                chain,
                network: None,
            }),
        })
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn address(&self) -> String {
        self.keypair.address()
    }

    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key_hex()
    }

    /// Attach the network coordinator. Remote-block dispatch is wired by
    /// [`crate::wire_network`].
    pub fn set_network(&self, network: Arc<P2pCoordinator>) {
        self.inner.lock().network = Some(network);
    }

    // -- queries ----------------------------------------------------------------

    /// Snapshot of the player state after catching up pending ticks.
    pub fn player_state(&self) -> Result<PlayerState, NodeError> {
        let mut inner = self.inner.lock();
        self.catch_up(&mut inner)?;
        Ok(inner.state.clone())
    }

    pub fn chain_status(&self) -> ChainStatus {
        let inner = self.inner.lock();
        let latest = inner.chain.latest();
        ChainStatus {
            player_id: self.player_id.clone(),
            length: inner.chain.len() as u64,
            latest_hash: latest.hash.clone(),
            latest_index: latest.index,
        }
    }

    /// Full structural + replay validation of our own chain.
    pub fn verify_chain(&self) -> ChainValidation {
        let inner = self.inner.lock();
        validate_chain_with_replay(inner.chain.blocks(), inner.state.created_at)
    }

    /// The newest `n` blocks, oldest first.
    pub fn chain_blocks(&self, n: usize) -> Vec<Block> {
        self.inner.lock().chain.tail(n).to_vec()
    }

    /// A snapshot of the shared world handle for read surfaces.
    pub fn world(&self) -> Arc<Mutex<WorldDoc>> {
        Arc::clone(&self.doc)
    }

    // -- tick driving -------------------------------------------------------------

    /// Process all pending ticks; returns how many were processed.
    pub fn catch_up_ticks(&self) -> Result<u64, NodeError> {
        let mut inner = self.inner.lock();
        self.catch_up(&mut inner)
    }

    fn catch_up(&self, inner: &mut Inner) -> Result<u64, NodeError> {
        let now = (self.now_fn)();
        let target = self.clock.current_tick(now);
        let from = inner.state.last_tick_processed;
        if target <= from {
            return Ok(0);
        }
        systems::process_tick_range(&mut inner.state, from, target)?;
        let processed = target - from;
        self.persist_snapshot(&inner.state)?;
        if let Some(network) = &inner.network {
            network.set_era(inner.state.era);
        }
        tracing::debug!(processed, tick = target, "caught up ticks");
        Ok(processed)
    }

    /// Persist the current state snapshot outside the command path.
    pub fn persist(&self) -> Result<(), NodeError> {
        let inner = self.inner.lock();
        self.persist_snapshot(&inner.state)
    }

    fn persist_snapshot(&self, state: &PlayerState) -> Result<(), NodeError> {
        let hash = state_hash(state)?;
        let json = String::from_utf8(state.serialize()?)
            .map_err(|e| NodeError::Identity(format!("state encoding: {e}")))?;
        self.store
            .lock()
            .save_snapshot(&self.player_id, state.last_tick_processed, &json, &hash)?;
        Ok(())
    }

    /// Cooperative shutdown: stop the network, flush state.
    pub fn shutdown(&self) -> Result<(), NodeError> {
        let network = self.inner.lock().network.take();
        if let Some(network) = network {
            network.shutdown();
        }
        self.persist()?;
        tracing::info!(player = %self.player_id, "controller shut down");
        Ok(())
    }

    // -- the command envelope --------------------------------------------------------

    /// Catch up, execute, and -- on success -- persist + sign + broadcast.
    pub fn execute_and_record(&self, kind: CommandKind) -> Result<CommandOutcome, NodeError> {
        let mut inner = self.inner.lock();
        self.catch_up(&mut inner)?;

        let command = GameCommand {
            kind,
            tick: inner.state.tick,
        };
        let outcome = execute(&mut inner.state, &command);
        if !outcome.success {
            tracing::debug!(command = command.kind.type_name(), message = %outcome.message, "command failed");
            return Ok(outcome);
        }

        let now = (self.now_fn)();
        let hash = state_hash(&inner.state)?;
        let json = String::from_utf8(inner.state.serialize()?)
            .map_err(|e| NodeError::Identity(format!("state encoding: {e}")))?;
        let block = inner
            .chain
            .append(command.clone(), &hash, now, &self.keypair)?
            .clone();
        self.store.lock().save_command_result(
            &self.player_id,
            inner.state.last_tick_processed,
            &json,
            &hash,
            &block,
        )?;

        if let Some(network) = inner.network.clone() {
            network.broadcast_block(&block, now);
        }
        self.publish_derived(&mut inner, &command, &outcome)?;
        tracing::info!(
            command = command.kind.type_name(),
            index = block.index,
            "command recorded"
        );
        Ok(outcome)
    }

    /// Derived shared-world mutations after a successful command. The
    /// ranking is refreshed on every command; the rest depend on what ran.
    fn publish_derived(
        &self,
        inner: &mut Inner,
        command: &GameCommand,
        outcome: &CommandOutcome,
    ) -> Result<(), NodeError> {
        let ranking = self.build_ranking(&inner.state)?;
        {
            let mut doc = self.doc.lock();
            doc.update_ranking(&self.player_id, &ranking)?;

            match &command.kind {
                CommandKind::Explore { zone_id } => {
                    doc.add_zone_discovery(zone_id, &self.player_id)?;
                }
                CommandKind::Claim { zone_id } => {
                    doc.claim_zone(zone_id, &self.player_id)?;
                }
                CommandKind::CreateTradeOffer { offering, requesting, .. } => {
                    if let Some(offer_id) = outcome
                        .data
                        .as_ref()
                        .and_then(|d| d.get("offerId"))
                        .and_then(|v| v.as_str())
                    {
                        let entry = sign_entry(
                            &TradeOfferEntry {
                                id: offer_id.to_owned(),
                                from: self.player_id.clone(),
                                offer: offering.clone(),
                                want: requesting.clone(),
                                created_at: command.tick,
                                signature: String::new(),
                                signed_by: String::new(),
                            },
                            &self.keypair,
                        )?;
                        doc.add_trade_offer(&entry)?;
                    }
                }
                CommandKind::CancelTradeOffer { offer_id } => {
                    doc.remove_trade_offer(offer_id)?;
                }
                CommandKind::CreateAlliance { .. } | CommandKind::JoinAlliance { .. } => {
                    if let Some(alliance) = &inner.state.alliance {
                        let entry = sign_entry(
                            &AllianceEntry {
                                id: alliance.id.clone(),
                                name: alliance.name.clone(),
                                leader_id: alliance.leader_id.clone(),
                                members: alliance.member_ids.clone(),
                                signature: String::new(),
                                signed_by: String::new(),
                            },
                            &self.keypair,
                        )?;
                        doc.upsert_alliance(&entry)?;
                    }
                }
                CommandKind::LeaveAlliance => {
                    if let Some(data) = &outcome.data {
                        let disbanded = data
                            .get("disbanded")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        if disbanded {
                            if let Some(id) = data.get("allianceId").and_then(|v| v.as_str()) {
                                doc.remove_alliance(id)?;
                            }
                        }
                    }
                }
                CommandKind::Attack { target } => {
                    self.publish_combat_log(&mut doc, outcome, &self.player_id, target, command.tick)?;
                }
                CommandKind::PvpAttack {
                    target_player_id, ..
                } => {
                    self.publish_combat_log(
                        &mut doc,
                        outcome,
                        &self.player_id,
                        target_player_id,
                        command.tick,
                    )?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn publish_combat_log(
        &self,
        doc: &mut WorldDoc,
        outcome: &CommandOutcome,
        attacker: &str,
        defender: &str,
        tick: u64,
    ) -> Result<(), NodeError> {
        let winner = outcome
            .data
            .as_ref()
            .and_then(|d| d.get("winner"))
            .and_then(|w| w.as_str())
            .map(|w| match w {
                "attacker" => attacker.to_owned(),
                "defender" => defender.to_owned(),
                _ => "draw".to_owned(),
            })
            .unwrap_or_else(|| "draw".to_owned());
        doc.add_combat_log(&CombatLogEntry {
            attacker: attacker.to_owned(),
            defender: defender.to_owned(),
            winner,
            tick,
        })?;
        Ok(())
    }

    fn build_ranking(&self, state: &PlayerState) -> Result<RankingEntry, NodeError> {
        let entry = RankingEntry {
            name: state.name.clone(),
            era: state.era,
            prestige: state.prestige.level,
            tokens: state.tokens,
            total_army: state.army.total_units(),
            total_resources: state.resources.values().sum(),
            army_units: state.army.units.clone(),
            strategy: state.army.strategy,
            defense_bonus: state.building_defense_bonus(),
            alliance_id: state.alliance.as_ref().map(|a| a.id.clone()),
            alliance_name: state.alliance.as_ref().map(|a| a.name.clone()),
            signature: String::new(),
            signed_by: String::new(),
        };
        Ok(sign_entry(&entry, &self.keypair)?)
    }

    // -- command surface ---------------------------------------------------------------

    pub fn build(&self, building_id: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Build {
            building_id: building_id.to_owned(),
        })
    }

    pub fn upgrade(&self, building_id: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Upgrade {
            building_id: building_id.to_owned(),
        })
    }

    pub fn demolish(&self, building_id: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Demolish {
            building_id: building_id.to_owned(),
        })
    }

    pub fn recruit(&self, unit_type: UnitKind, count: u32) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Recruit { unit_type, count })
    }

    pub fn set_strategy(&self, strategy: Strategy) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::SetStrategy { strategy })
    }

    pub fn start_research(&self, tech_id: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::StartResearch {
            tech_id: tech_id.to_owned(),
        })
    }

    pub fn explore(&self, zone_id: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Explore {
            zone_id: zone_id.to_owned(),
        })
    }

    /// Claim a zone. Checked against the shared world first: a zone someone
    /// else already holds cannot be claimed locally.
    pub fn claim(&self, zone_id: &str) -> Result<CommandOutcome, NodeError> {
        let held_by_other = {
            let mut doc = self.doc.lock();
            doc.zone(zone_id)?
                .and_then(|z| z.claimed_by)
                .is_some_and(|holder| holder != self.player_id)
        };
        if held_by_other {
            return Ok(CommandOutcome::fail(format!(
                "'{zone_id}' is already claimed by another player"
            )));
        }
        self.execute_and_record(CommandKind::Claim {
            zone_id: zone_id.to_owned(),
        })
    }

    pub fn attack_npc(&self, target: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Attack {
            target: target.to_owned(),
        })
    }

    pub fn create_alliance(&self, name: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::CreateAlliance {
            name: name.to_owned(),
        })
    }

    pub fn join_alliance(
        &self,
        id: &str,
        name: &str,
        leader_id: &str,
    ) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::JoinAlliance {
            id: id.to_owned(),
            name: name.to_owned(),
            leader_id: leader_id.to_owned(),
        })
    }

    pub fn leave_alliance(&self) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::LeaveAlliance)
    }

    pub fn set_diplomacy(
        &self,
        target: &str,
        status: DiplomacyStatus,
    ) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::SetDiplomacy {
            target_player_id: target.to_owned(),
            status,
        })
    }

    /// Spy on another player using their published ranking as ground truth.
    pub fn spy(&self, target_id: &str) -> Result<CommandOutcome, NodeError> {
        let target = {
            let mut doc = self.doc.lock();
            doc.ranking(target_id)?
        };
        let Some(target) = target else {
            return Ok(CommandOutcome::fail(format!(
                "no intelligence available on '{target_id}'"
            )));
        };
        let mut resources = BTreeMap::new();
        // The ranking only exposes a total; spread it for the estimate.
        resources.insert(ResourceKind::Wood, target.total_resources);
        self.execute_and_record(CommandKind::Spy {
            target_id: target_id.to_owned(),
            target_name: target.name.clone(),
            army: target.army_units.clone(),
            resources,
            era: target.era,
        })
    }

    pub fn create_trade_offer(
        &self,
        offering: BTreeMap<ResourceKind, u64>,
        requesting: BTreeMap<ResourceKind, u64>,
        expires_in_ticks: Option<u64>,
    ) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::CreateTradeOffer {
            offering,
            requesting,
            expires_in_ticks,
        })
    }

    pub fn cancel_trade_offer(&self, offer_id: &str) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::CancelTradeOffer {
            offer_id: offer_id.to_owned(),
        })
    }

    /// Accept a trade: our own open offers first, then the shared board.
    pub fn accept_trade(&self, offer_id: &str) -> Result<CommandOutcome, NodeError> {
        // Local path: the offer lives in our own state.
        let is_local = {
            let inner = self.inner.lock();
            inner.state.trade_offer(offer_id).is_some()
        };
        if is_local {
            let buyer_resources = {
                let inner = self.inner.lock();
                inner.state.resources.clone()
            };
            return self.execute_and_record(CommandKind::AcceptTrade {
                offer_id: offer_id.to_owned(),
                buyer_resources,
                buyer_id: Some(self.player_id.clone()),
            });
        }

        // Shared-board path: swap resources locally, record + broadcast the
        // acceptance so the seller credits themselves, drop the offer.
        let board_offer = {
            let mut doc = self.doc.lock();
            doc.trade_offers()?
                .into_iter()
                .find(|offer| offer.id == offer_id)
        };
        let Some(offer) = board_offer else {
            return Ok(CommandOutcome::fail(format!("offer '{offer_id}' not found")));
        };
        if offer.from == self.player_id {
            return Ok(CommandOutcome::fail("cannot accept your own offer"));
        }

        let mut inner = self.inner.lock();
        self.catch_up(&mut inner)?;
        if !inner.state.has_resources(&offer.want) {
            return Ok(CommandOutcome::fail(
                "insufficient resources to pay for this offer",
            ));
        }
        let buyer_resources = inner.state.resources.clone();
        inner.state.deduct_resources(&offer.want);
        inner.state.credit_resources(&offer.offer);

        let command = GameCommand {
            kind: CommandKind::AcceptTrade {
                offer_id: offer_id.to_owned(),
                buyer_resources,
                buyer_id: Some(self.player_id.clone()),
            },
            tick: inner.state.tick,
        };
        let now = (self.now_fn)();
        let hash = state_hash(&inner.state)?;
        let json = String::from_utf8(inner.state.serialize()?)
            .map_err(|e| NodeError::Identity(format!("state encoding: {e}")))?;
        let block = inner
            .chain
            .append(command, &hash, now, &self.keypair)?
            .clone();
        self.store.lock().save_command_result(
            &self.player_id,
            inner.state.last_tick_processed,
            &json,
            &hash,
            &block,
        )?;
        if let Some(network) = inner.network.clone() {
            network.broadcast_block(&block, now);
        }
        let ranking = self.build_ranking(&inner.state)?;
        {
            let mut doc = self.doc.lock();
            doc.remove_trade_offer(offer_id)?;
            doc.update_ranking(&self.player_id, &ranking)?;
        }
        tracing::info!(offer = %offer_id, seller = %offer.from, "accepted shared-board offer");
        Ok(CommandOutcome::ok(format!("offer '{offer_id}' accepted")))
    }

    /// Attack another player, pulling their declared posture from the shared
    /// rankings. Our army snapshot rides in the block so the defender can
    /// replay the identical battle.
    pub fn pvp_attack(&self, target_id: &str) -> Result<CommandOutcome, NodeError> {
        let target = {
            let mut doc = self.doc.lock();
            doc.ranking(target_id)?
        };
        let Some(target) = target else {
            return Ok(CommandOutcome::fail(format!(
                "no intelligence available on '{target_id}'"
            )));
        };
        let (attacker_army, attacker_strategy) = {
            let inner = self.inner.lock();
            (inner.state.army.units.clone(), inner.state.army.strategy)
        };
        self.execute_and_record(CommandKind::PvpAttack {
            target_player_id: target_id.to_owned(),
            target_army: target.army_units.clone(),
            target_strategy: target.strategy,
            target_defense_bonus: target.defense_bonus,
            rng_seed: None,
            attacker_army: Some(attacker_army),
            attacker_strategy: Some(attacker_strategy),
        })
    }

    /// Variant used by tests and the tool surface when the caller supplies
    /// the target snapshot directly.
    #[allow(clippy::too_many_arguments)]
    pub fn pvp_attack_with_snapshot(
        &self,
        target_id: &str,
        target_army: BTreeMap<UnitKind, u32>,
        target_strategy: Strategy,
        target_defense_bonus: f64,
        rng_seed: Option<String>,
    ) -> Result<CommandOutcome, NodeError> {
        let (attacker_army, attacker_strategy) = {
            let inner = self.inner.lock();
            (inner.state.army.units.clone(), inner.state.army.strategy)
        };
        self.execute_and_record(CommandKind::PvpAttack {
            target_player_id: target_id.to_owned(),
            target_army,
            target_strategy,
            target_defense_bonus,
            rng_seed,
            attacker_army: Some(attacker_army),
            attacker_strategy: Some(attacker_strategy),
        })
    }

    pub fn ascend(&self) -> Result<CommandOutcome, NodeError> {
        self.execute_and_record(CommandKind::Ascend)
    }
}

// ---------------------------------------------------------------------------
// Remote-action application
// ---------------------------------------------------------------------------

impl RemoteGameHooks for GameController {
    fn local_player_id(&self) -> String {
        self.player_id.clone()
    }

    /// A remote buyer accepted one of our open offers: first observation
    /// wins; a second acceptance finds the offer non-open and is a no-op.
    fn apply_remote_accept_trade(&self, offer_id: &str, buyer_id: &str) {
        let mut inner = self.inner.lock();
        let Some(offer) = inner.state.trade_offer(offer_id) else {
            return;
        };
        if offer.status != TradeStatus::Open {
            tracing::debug!(offer = %offer_id, "remote acceptance of non-open offer ignored");
            return;
        }
        let requesting = offer.requesting.clone();
        if let Some(offer) = inner.state.trade_offer_mut(offer_id) {
            offer.status = TradeStatus::Accepted;
        }
        inner.state.credit_resources(&requesting);
        if let Err(e) = self.persist_snapshot(&inner.state) {
            tracing::error!(error = %e, "persisting remote trade settlement failed");
        }
        if let Err(e) = self.doc.lock().remove_trade_offer(offer_id) {
            tracing::warn!(error = %e, "removing settled offer from board failed");
        }
        tracing::info!(offer = %offer_id, buyer = %buyer_id, "offer settled by remote buyer");
    }

    /// A remote player attacked us. The battle replays against our ACTUAL
    /// state with the attacker's declared army; both sides compute the same
    /// report from the shared seed.
    fn apply_remote_pvp_attack(
        &self,
        attacker_id: &str,
        attacker_army: &BTreeMap<UnitKind, u32>,
        attacker_strategy: Strategy,
        rng_seed: Option<&str>,
        tick: u64,
    ) {
        let mut inner = self.inner.lock();
        let attacker = BattleSide {
            units: attacker_army.clone(),
            strategy: attacker_strategy,
            defense_bonus: 0.0,
        };
        let defender = BattleSide {
            units: inner.state.army.units.clone(),
            strategy: inner.state.army.strategy,
            defense_bonus: inner.state.building_defense_bonus(),
        };
        let seed = rng_seed
            .map(str::to_owned)
            .unwrap_or_else(|| battle::pvp_seed(attacker_id, &self.player_id, tick));
        let mut rng = GameRng::from_seed(&seed);
        let report = battle::resolve_battle(&attacker, &defender, &mut rng, attacker_id, &self.player_id);

        for (kind, lost) in &report.defender_losses {
            if let Some(count) = inner.state.army.units.get_mut(kind) {
                *count = count.saturating_sub(*lost);
            }
        }
        if report.winner == BattleWinner::Attacker {
            // The loot leaves our treasury, floored at zero.
            inner.state.tokens = (inner.state.tokens - report.loot_tokens).max(0.0);
        }
        if let Err(e) = self.persist_snapshot(&inner.state) {
            tracing::error!(error = %e, "persisting post-battle state failed");
        }

        let winner = match report.winner {
            BattleWinner::Attacker => attacker_id.to_owned(),
            BattleWinner::Defender => self.player_id.clone(),
            BattleWinner::Draw => "draw".to_owned(),
        };
        if let Err(e) = self.doc.lock().add_combat_log(&CombatLogEntry {
            attacker: attacker_id.to_owned(),
            defender: self.player_id.clone(),
            winner,
            tick,
        }) {
            tracing::warn!(error = %e, "publishing combat log failed");
        }
        tracing::info!(
            attacker = %attacker_id,
            winner = ?report.winner,
            "defended against remote attack"
        );
    }

    fn apply_remote_set_diplomacy(&self, from_player_id: &str, status: DiplomacyStatus, tick: u64) {
        let mut inner = self.inner.lock();
        inner.state.upsert_diplomacy(from_player_id, status, tick);
        if let Err(e) = self.persist_snapshot(&inner.state) {
            tracing::error!(error = %e, "persisting diplomacy change failed");
        }
        tracing::info!(from = %from_player_id, ?status, "diplomacy mirrored from remote");
    }
}
