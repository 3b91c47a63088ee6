//! Game commands and their handlers.
//!
//! A command is a deferred mutation executed inside the controller's critical
//! section. Handlers are pure functions over the state: a failed validation
//! returns `success = false` with an explanatory message and leaves the state
//! byte-for-byte unchanged. Randomized commands (attack, spy) derive their
//! RNG from a composite seed of the actors and the tick, so replaying the
//! command chain reproduces identical state.
//!
//! The set of commands is a closed tagged enum rather than open-ended
//! polymorphism: dispatch order and the wire `type` strings are explicit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::battle::{self, BattleSide, BattleWinner};
use crate::content::{self, Biome, ResourceKind, UnitKind, CUARTEL};
use crate::formulas;
use crate::rng::GameRng;
use crate::state::{
    Alliance, BonusKind, BuildingInstance, DiplomacyStatus, PlayerState, Population, PrestigeBonus,
    Research, Strategy, TradeOffer, TradeStatus, INITIAL_POPULATION, INITIAL_RESOURCES,
    INITIAL_STORAGE, SPY_REPORT_LIMIT,
};

/// Ticks a spy network needs between missions.
pub const SPY_COOLDOWN_TICKS: u64 = 10;

/// Ticks between attacks on the same player.
pub const PVP_COOLDOWN_TICKS: u64 = 20;

/// Default lifetime of a trade offer.
pub const TRADE_DEFAULT_EXPIRY_TICKS: u64 = 100;

/// Token cost of an ascension.
pub const ASCEND_TOKEN_COST: f64 = 500.0;

// ---------------------------------------------------------------------------
// Command payloads
// ---------------------------------------------------------------------------

/// Every command the engine understands, tagged for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum CommandKind {
    /// Chain genesis marker; recorded, never executed.
    Genesis {
        player_name: String,
        biome: Biome,
        seed: String,
    },
    Build {
        building_id: String,
    },
    Upgrade {
        building_id: String,
    },
    Demolish {
        building_id: String,
    },
    Recruit {
        unit_type: UnitKind,
        count: u32,
    },
    SetStrategy {
        strategy: Strategy,
    },
    StartResearch {
        tech_id: String,
    },
    Explore {
        zone_id: String,
    },
    Claim {
        zone_id: String,
    },
    /// Raid a fixed NPC camp.
    Attack {
        target: String,
    },
    CreateAlliance {
        name: String,
    },
    JoinAlliance {
        id: String,
        name: String,
        leader_id: String,
    },
    LeaveAlliance,
    SetDiplomacy {
        target_player_id: String,
        status: DiplomacyStatus,
    },
    Spy {
        target_id: String,
        target_name: String,
        army: BTreeMap<UnitKind, u32>,
        resources: BTreeMap<ResourceKind, u64>,
        era: u8,
    },
    CreateTradeOffer {
        offering: BTreeMap<ResourceKind, u64>,
        requesting: BTreeMap<ResourceKind, u64>,
        #[serde(default)]
        expires_in_ticks: Option<u64>,
    },
    AcceptTrade {
        offer_id: String,
        buyer_resources: BTreeMap<ResourceKind, u64>,
        #[serde(default)]
        buyer_id: Option<String>,
    },
    CancelTradeOffer {
        offer_id: String,
    },
    PvpAttack {
        target_player_id: String,
        target_army: BTreeMap<UnitKind, u32>,
        target_strategy: Strategy,
        #[serde(default)]
        target_defense_bonus: f64,
        #[serde(default)]
        rng_seed: Option<String>,
        /// Snapshot of the attacker's army, set by the controller before
        /// broadcast so the defender can replay the identical battle.
        #[serde(default)]
        attacker_army: Option<BTreeMap<UnitKind, u32>>,
        #[serde(default)]
        attacker_strategy: Option<Strategy>,
    },
    Ascend,
}

impl CommandKind {
    /// The wire `type` string of this command.
    pub fn type_name(&self) -> &'static str {
        match self {
            CommandKind::Genesis { .. } => "genesis",
            CommandKind::Build { .. } => "build",
            CommandKind::Upgrade { .. } => "upgrade",
            CommandKind::Demolish { .. } => "demolish",
            CommandKind::Recruit { .. } => "recruit",
            CommandKind::SetStrategy { .. } => "set-strategy",
            CommandKind::StartResearch { .. } => "start-research",
            CommandKind::Explore { .. } => "explore",
            CommandKind::Claim { .. } => "claim",
            CommandKind::Attack { .. } => "attack",
            CommandKind::CreateAlliance { .. } => "create-alliance",
            CommandKind::JoinAlliance { .. } => "join-alliance",
            CommandKind::LeaveAlliance => "leave-alliance",
            CommandKind::SetDiplomacy { .. } => "set-diplomacy",
            CommandKind::Spy { .. } => "spy",
            CommandKind::CreateTradeOffer { .. } => "create-trade-offer",
            CommandKind::AcceptTrade { .. } => "accept-trade",
            CommandKind::CancelTradeOffer { .. } => "cancel-trade-offer",
            CommandKind::PvpAttack { .. } => "pvp-attack",
            CommandKind::Ascend => "ascend",
        }
    }
}

/// A command stamped with the tick it executes at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCommand {
    #[serde(flatten)]
    pub kind: CommandKind,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Execute one command against the state. Failures leave the state unchanged.
pub fn execute(state: &mut PlayerState, command: &GameCommand) -> CommandOutcome {
    let tick = command.tick;
    match &command.kind {
        CommandKind::Genesis { .. } => CommandOutcome::fail("genesis blocks are not executable"),
        CommandKind::Build { building_id } => build(state, building_id),
        CommandKind::Upgrade { building_id } => upgrade(state, building_id),
        CommandKind::Demolish { building_id } => demolish(state, building_id),
        CommandKind::Recruit { unit_type, count } => recruit(state, *unit_type, *count),
        CommandKind::SetStrategy { strategy } => set_strategy(state, *strategy),
        CommandKind::StartResearch { tech_id } => start_research(state, tech_id),
        CommandKind::Explore { zone_id } => explore(state, zone_id),
        CommandKind::Claim { zone_id } => claim(state, zone_id),
        CommandKind::Attack { target } => attack_npc(state, target, tick),
        CommandKind::CreateAlliance { name } => create_alliance(state, name, tick),
        CommandKind::JoinAlliance {
            id,
            name,
            leader_id,
        } => join_alliance(state, id, name, leader_id, tick),
        CommandKind::LeaveAlliance => leave_alliance(state),
        CommandKind::SetDiplomacy {
            target_player_id,
            status,
        } => set_diplomacy(state, target_player_id, *status, tick),
        CommandKind::Spy {
            target_id,
            target_name,
            army,
            resources,
            era,
        } => spy(state, target_id, target_name, army, resources, *era, tick),
        CommandKind::CreateTradeOffer {
            offering,
            requesting,
            expires_in_ticks,
        } => create_trade_offer(state, offering, requesting, *expires_in_ticks, tick),
        CommandKind::AcceptTrade {
            offer_id,
            buyer_resources,
            ..
        } => accept_trade(state, offer_id, buyer_resources),
        CommandKind::CancelTradeOffer { offer_id } => cancel_trade_offer(state, offer_id),
        CommandKind::PvpAttack {
            target_player_id,
            target_army,
            target_strategy,
            target_defense_bonus,
            rng_seed,
            ..
        } => pvp_attack(
            state,
            target_player_id,
            target_army,
            *target_strategy,
            *target_defense_bonus,
            rng_seed.as_deref(),
            tick,
        ),
        CommandKind::Ascend => ascend(state),
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

fn cost_map(entries: &[(ResourceKind, u64)]) -> BTreeMap<ResourceKind, u64> {
    entries.iter().copied().collect()
}

fn build(state: &mut PlayerState, building_id: &str) -> CommandOutcome {
    let Some(def) = content::building(building_id) else {
        return CommandOutcome::fail(format!("unknown building '{building_id}'"));
    };
    if state.building(building_id).is_some()
        || state.build_queue.iter().any(|b| b.id == building_id)
    {
        return CommandOutcome::fail(format!("'{building_id}' is already built"));
    }
    if def.era > state.era {
        return CommandOutcome::fail(format!("'{building_id}' requires era {}", def.era));
    }
    if let Some(tech) = def.requires_tech {
        if !state.research.completed.contains(tech) {
            return CommandOutcome::fail(format!("'{building_id}' requires the '{tech}' tech"));
        }
    }
    let cost = cost_map(def.cost);
    if !state.deduct_resources(&cost) {
        return CommandOutcome::fail(format!("insufficient resources for '{building_id}'"));
    }
    state.buildings.push(BuildingInstance {
        id: building_id.to_owned(),
        level: 1,
        construction_ticks_remaining: def.construction_ticks,
    });
    CommandOutcome::ok(format!(
        "construction of '{building_id}' started ({} ticks)",
        def.construction_ticks
    ))
}

fn upgrade(state: &mut PlayerState, building_id: &str) -> CommandOutcome {
    let Some(def) = content::building(building_id) else {
        return CommandOutcome::fail(format!("unknown building '{building_id}'"));
    };
    let Some(instance) = state.building(building_id) else {
        return CommandOutcome::fail(format!("'{building_id}' is not built"));
    };
    if !instance.is_completed() {
        return CommandOutcome::fail(format!("'{building_id}' is still under construction"));
    }
    if instance.level >= def.max_level {
        return CommandOutcome::fail(format!("'{building_id}' is already at max level"));
    }
    let level = instance.level;
    let cost: BTreeMap<ResourceKind, u64> = def
        .cost
        .iter()
        .map(|(kind, base)| (*kind, formulas::building_cost(*base, level, formulas::COST_GROWTH)))
        .collect();
    if !state.deduct_resources(&cost) {
        return CommandOutcome::fail(format!("insufficient resources to upgrade '{building_id}'"));
    }
    let instance = state
        .building_mut(building_id)
        .expect("checked above; still present");
    instance.level += 1;
    instance.construction_ticks_remaining = def.construction_ticks;
    let new_level = instance.level;
    CommandOutcome::ok(format!("upgrading '{building_id}' to level {new_level}"))
}

fn demolish(state: &mut PlayerState, building_id: &str) -> CommandOutcome {
    let Some(def) = content::building(building_id) else {
        return CommandOutcome::fail(format!("unknown building '{building_id}'"));
    };
    if state.building(building_id).is_none() {
        return CommandOutcome::fail(format!("'{building_id}' is not built"));
    }
    state.buildings.retain(|b| b.id != building_id);
    for (kind, base) in def.cost {
        state.add_resource(*kind, base / 2);
    }
    CommandOutcome::ok(format!("'{building_id}' demolished"))
}

// ---------------------------------------------------------------------------
// Military
// ---------------------------------------------------------------------------

fn recruit(state: &mut PlayerState, unit_type: UnitKind, count: u32) -> CommandOutcome {
    if count == 0 {
        return CommandOutcome::fail("recruit count must be positive");
    }
    if state.completed_levels(CUARTEL) == 0 {
        return CommandOutcome::fail("recruiting requires a completed cuartel");
    }
    let def = content::unit(unit_type);
    if def.era > state.era {
        return CommandOutcome::fail(format!("'{unit_type}' requires era {}", def.era));
    }
    let cost: BTreeMap<ResourceKind, u64> = def
        .cost
        .iter()
        .map(|(kind, base)| (*kind, base * count as u64))
        .collect();
    if !state.deduct_resources(&cost) {
        return CommandOutcome::fail(format!("insufficient resources to recruit {count} {unit_type}"));
    }
    *state.army.units.entry(unit_type).or_insert(0) += count;
    CommandOutcome::ok(format!("recruited {count} {unit_type}"))
}

fn set_strategy(state: &mut PlayerState, strategy: Strategy) -> CommandOutcome {
    state.army.strategy = strategy;
    CommandOutcome::ok("strategy updated")
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

fn start_research(state: &mut PlayerState, tech_id: &str) -> CommandOutcome {
    let Some(def) = content::tech(tech_id) else {
        return CommandOutcome::fail(format!("unknown tech '{tech_id}'"));
    };
    if state.research.completed.contains(tech_id) {
        return CommandOutcome::fail(format!("'{tech_id}' is already researched"));
    }
    if state.research.current.as_deref() == Some(tech_id) {
        return CommandOutcome::fail(format!("'{tech_id}' is already being researched"));
    }
    for prereq in def.prerequisites {
        if !state.research.completed.contains(*prereq) {
            return CommandOutcome::fail(format!("'{tech_id}' requires '{prereq}' first"));
        }
    }
    let cost = cost_map(def.cost);
    if !state.deduct_resources(&cost) {
        return CommandOutcome::fail(format!("insufficient resources for '{tech_id}'"));
    }
    // Switching topics abandons any in-flight progress.
    state.research.current = Some(tech_id.to_owned());
    state.research.progress = 0;
    CommandOutcome::ok(format!("research of '{tech_id}' started"))
}

// ---------------------------------------------------------------------------
// Exploration
// ---------------------------------------------------------------------------

fn explore(state: &mut PlayerState, zone_id: &str) -> CommandOutcome {
    if !content::zone_exists(zone_id) {
        return CommandOutcome::fail(format!("unknown zone '{zone_id}'"));
    }
    if state.explored_zones.contains(zone_id) {
        return CommandOutcome::fail(format!("'{zone_id}' is already explored"));
    }
    state.explored_zones.insert(zone_id.to_owned());
    CommandOutcome::ok(format!("'{zone_id}' explored"))
}

fn claim(state: &mut PlayerState, zone_id: &str) -> CommandOutcome {
    if !content::zone_exists(zone_id) {
        return CommandOutcome::fail(format!("unknown zone '{zone_id}'"));
    }
    if !state.explored_zones.contains(zone_id) {
        return CommandOutcome::fail(format!("'{zone_id}' must be explored before claiming"));
    }
    if state.claimed_zones.contains(zone_id) {
        return CommandOutcome::fail(format!("'{zone_id}' is already claimed"));
    }
    state.claimed_zones.insert(zone_id.to_owned());
    CommandOutcome::ok(format!("'{zone_id}' claimed"))
}

// ---------------------------------------------------------------------------
// NPC combat
// ---------------------------------------------------------------------------

fn attack_npc(state: &mut PlayerState, target: &str, tick: u64) -> CommandOutcome {
    let Some(npc) = content::npc_target(target) else {
        return CommandOutcome::fail(format!("unknown target '{target}'"));
    };
    if state.army.is_empty() {
        return CommandOutcome::fail("no army to attack with");
    }
    let attacker = BattleSide::new(state.army.units.clone(), state.army.strategy);
    let defender = BattleSide::new(npc.army.iter().copied().collect(), Strategy::Balanced);
    let mut rng = GameRng::from_seed(&format!("npc-{}-{target}-{tick}", state.id));
    let report = battle::resolve_battle(&attacker, &defender, &mut rng, &state.id, target);

    apply_losses(state, &report.attacker_losses);
    let message = match report.winner {
        BattleWinner::Attacker => {
            state.tokens += report.loot_tokens + npc.reward_tokens;
            format!(
                "victory against {target}: +{} tokens",
                report.loot_tokens + npc.reward_tokens
            )
        }
        BattleWinner::Defender => format!("defeat against {target}"),
        BattleWinner::Draw => format!("stalemate against {target}"),
    };
    let data = serde_json::to_value(&report).expect("battle report serializes");
    CommandOutcome::ok_with(message, data)
}

fn apply_losses(state: &mut PlayerState, losses: &BTreeMap<UnitKind, u32>) {
    for (kind, lost) in losses {
        if let Some(count) = state.army.units.get_mut(kind) {
            *count = count.saturating_sub(*lost);
        }
    }
}

// ---------------------------------------------------------------------------
// Alliances
// ---------------------------------------------------------------------------

fn create_alliance(state: &mut PlayerState, name: &str, tick: u64) -> CommandOutcome {
    if state.alliance.is_some() {
        return CommandOutcome::fail("already in an alliance");
    }
    let id = format!("alliance-{}-{tick}", state.id);
    state.alliance = Some(Alliance {
        id: id.clone(),
        name: name.to_owned(),
        leader_id: state.id.clone(),
        member_ids: vec![state.id.clone()],
        created_at_tick: tick,
    });
    CommandOutcome::ok_with(
        format!("alliance '{name}' founded"),
        serde_json::json!({ "allianceId": id }),
    )
}

fn join_alliance(
    state: &mut PlayerState,
    id: &str,
    name: &str,
    leader_id: &str,
    tick: u64,
) -> CommandOutcome {
    if state.alliance.is_some() {
        return CommandOutcome::fail("already in an alliance");
    }
    let mut member_ids = vec![leader_id.to_owned()];
    if leader_id != state.id {
        member_ids.push(state.id.clone());
    }
    state.alliance = Some(Alliance {
        id: id.to_owned(),
        name: name.to_owned(),
        leader_id: leader_id.to_owned(),
        member_ids,
        created_at_tick: tick,
    });
    CommandOutcome::ok(format!("joined alliance '{name}'"))
}

fn leave_alliance(state: &mut PlayerState) -> CommandOutcome {
    let Some(alliance) = state.alliance.take() else {
        return CommandOutcome::fail("not in an alliance");
    };
    if alliance.leader_id == state.id {
        return CommandOutcome::ok_with(
            format!("alliance '{}' disbanded", alliance.name),
            serde_json::json!({ "disbanded": true, "allianceId": alliance.id }),
        );
    }
    CommandOutcome::ok_with(
        format!("left alliance '{}'", alliance.name),
        serde_json::json!({ "disbanded": false, "allianceId": alliance.id }),
    )
}

// ---------------------------------------------------------------------------
// Diplomacy
// ---------------------------------------------------------------------------

fn set_diplomacy(
    state: &mut PlayerState,
    target: &str,
    status: DiplomacyStatus,
    tick: u64,
) -> CommandOutcome {
    if target == state.id {
        return CommandOutcome::fail("cannot set diplomacy toward yourself");
    }
    state.upsert_diplomacy(target, status, tick);
    CommandOutcome::ok(format!("diplomacy toward '{target}' set"))
}

// ---------------------------------------------------------------------------
// Espionage
// ---------------------------------------------------------------------------

fn spy(
    state: &mut PlayerState,
    target_id: &str,
    target_name: &str,
    army: &BTreeMap<UnitKind, u32>,
    resources: &BTreeMap<ResourceKind, u64>,
    era: u8,
    tick: u64,
) -> CommandOutcome {
    if state.army.units.get(&UnitKind::Espia).copied().unwrap_or(0) == 0 {
        return CommandOutcome::fail("spying requires at least one espia");
    }
    if let Some(last) = state.last_spy_tick {
        let elapsed = tick.saturating_sub(last);
        if elapsed < SPY_COOLDOWN_TICKS {
            return CommandOutcome::fail(format!(
                "spy network recovering: {} more ticks",
                SPY_COOLDOWN_TICKS - elapsed
            ));
        }
    }

    // Estimates carry ±20% noise; traversal order is canonical so every
    // replay consumes the same RNG stream.
    let mut rng = GameRng::from_seed(&format!("spy-{}-{target_id}-{tick}", state.id));
    let mut estimated_army = BTreeMap::new();
    for kind in UnitKind::ALL {
        if let Some(count) = army.get(&kind) {
            let estimate = (*count as f64 * (1.0 + rng.next_range(-0.2, 0.2))).round();
            estimated_army.insert(kind, estimate.max(0.0) as u32);
        }
    }
    let mut estimated_resources = BTreeMap::new();
    for kind in ResourceKind::ALL {
        if let Some(amount) = resources.get(&kind) {
            let estimate = (*amount as f64 * (1.0 + rng.next_range(-0.2, 0.2))).round();
            estimated_resources.insert(kind, estimate.max(0.0) as u64);
        }
    }

    state.spy_reports.push(crate::state::SpyReport {
        target_id: target_id.to_owned(),
        target_name: target_name.to_owned(),
        era,
        estimated_army,
        estimated_resources,
        tick,
    });
    if state.spy_reports.len() > SPY_REPORT_LIMIT {
        let excess = state.spy_reports.len() - SPY_REPORT_LIMIT;
        state.spy_reports.drain(..excess);
    }
    state.last_spy_tick = Some(tick);
    CommandOutcome::ok(format!("spy report on '{target_name}' filed"))
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

fn create_trade_offer(
    state: &mut PlayerState,
    offering: &BTreeMap<ResourceKind, u64>,
    requesting: &BTreeMap<ResourceKind, u64>,
    expires_in_ticks: Option<u64>,
    tick: u64,
) -> CommandOutcome {
    if offering.values().all(|v| *v == 0) {
        return CommandOutcome::fail("nothing offered");
    }
    if !state.deduct_resources(offering) {
        return CommandOutcome::fail("insufficient resources to escrow the offer");
    }
    let id = format!("{}-{tick}-{}", state.id, state.trade_offers.len());
    let expires = expires_in_ticks.unwrap_or(TRADE_DEFAULT_EXPIRY_TICKS);
    state.trade_offers.push(TradeOffer {
        id: id.clone(),
        seller_id: state.id.clone(),
        offering: offering.clone(),
        requesting: requesting.clone(),
        created_at_tick: tick,
        expires_at_tick: tick + expires,
        status: TradeStatus::Open,
    });
    CommandOutcome::ok_with(
        format!("trade offer '{id}' opened"),
        serde_json::json!({ "offerId": id }),
    )
}

fn accept_trade(
    state: &mut PlayerState,
    offer_id: &str,
    buyer_resources: &BTreeMap<ResourceKind, u64>,
) -> CommandOutcome {
    let Some(offer) = state.trade_offer(offer_id) else {
        return CommandOutcome::fail(format!("offer '{offer_id}' not found"));
    };
    if offer.status != TradeStatus::Open {
        return CommandOutcome::fail(format!("offer '{offer_id}' is not open"));
    }
    let requesting = offer.requesting.clone();
    for (kind, amount) in &requesting {
        if buyer_resources.get(kind).copied().unwrap_or(0) < *amount {
            return CommandOutcome::fail("buyer resources insufficient for this offer");
        }
    }
    state
        .trade_offer_mut(offer_id)
        .expect("checked above; still present")
        .status = TradeStatus::Accepted;
    // Seller receives what they asked for; the escrowed goods travel to the
    // buyer on the buyer's node.
    state.credit_resources(&requesting);
    CommandOutcome::ok(format!("offer '{offer_id}' accepted"))
}

fn cancel_trade_offer(state: &mut PlayerState, offer_id: &str) -> CommandOutcome {
    let Some(offer) = state.trade_offer(offer_id) else {
        return CommandOutcome::fail(format!("offer '{offer_id}' not found"));
    };
    if offer.seller_id != state.id {
        return CommandOutcome::fail("only the seller can cancel an offer");
    }
    if offer.status != TradeStatus::Open {
        return CommandOutcome::fail(format!("offer '{offer_id}' is not open"));
    }
    let refund = offer.offering.clone();
    state
        .trade_offer_mut(offer_id)
        .expect("checked above; still present")
        .status = TradeStatus::Cancelled;
    state.credit_resources(&refund);
    CommandOutcome::ok(format!("offer '{offer_id}' cancelled"))
}

// ---------------------------------------------------------------------------
// PvP
// ---------------------------------------------------------------------------

fn pvp_attack(
    state: &mut PlayerState,
    target: &str,
    target_army: &BTreeMap<UnitKind, u32>,
    target_strategy: Strategy,
    target_defense_bonus: f64,
    rng_seed: Option<&str>,
    tick: u64,
) -> CommandOutcome {
    if target == state.id {
        return CommandOutcome::fail("cannot attack yourself");
    }
    if state.army.is_empty() {
        return CommandOutcome::fail("no army to attack with");
    }
    if let Some(last) = state.last_attack_ticks.get(target) {
        let elapsed = tick.saturating_sub(*last);
        if elapsed < PVP_COOLDOWN_TICKS {
            return CommandOutcome::fail(format!(
                "must wait {} more ticks before attacking '{target}' again",
                PVP_COOLDOWN_TICKS - elapsed
            ));
        }
    }

    let attacker = BattleSide::new(state.army.units.clone(), state.army.strategy);
    let defender = BattleSide {
        units: target_army.clone(),
        strategy: target_strategy,
        defense_bonus: target_defense_bonus,
    };
    let seed = rng_seed
        .map(str::to_owned)
        .unwrap_or_else(|| battle::pvp_seed(&state.id, target, tick));
    let mut rng = GameRng::from_seed(&seed);
    let report = battle::resolve_battle(&attacker, &defender, &mut rng, &state.id, target);

    apply_losses(state, &report.attacker_losses);
    state.last_attack_ticks.insert(target.to_owned(), tick);
    let message = match report.winner {
        BattleWinner::Attacker => {
            state.tokens += report.loot_tokens;
            format!("victory over '{target}': +{} tokens", report.loot_tokens)
        }
        BattleWinner::Defender => format!("defeat against '{target}'"),
        BattleWinner::Draw => format!("stalemate against '{target}'"),
    };
    let data = serde_json::to_value(&report).expect("battle report serializes");
    CommandOutcome::ok_with(message, data)
}

// ---------------------------------------------------------------------------
// Ascension
// ---------------------------------------------------------------------------

fn ascend(state: &mut PlayerState) -> CommandOutcome {
    if state.era < 2 {
        return CommandOutcome::fail("ascension requires at least era 2");
    }
    if state.tokens < ASCEND_TOKEN_COST {
        return CommandOutcome::fail(format!("ascension requires {ASCEND_TOKEN_COST} tokens"));
    }
    if state.tick < 50 {
        return CommandOutcome::fail("ascension requires at least tick 50");
    }

    state.tokens -= ASCEND_TOKEN_COST;
    state.prestige.level += 1;
    state.prestige.legacy_multiplier =
        formulas::legacy_multiplier(state.prestige.level, formulas::LEGACY_BONUS_PER_LEVEL);
    let bonus = match state.prestige.level % 4 {
        1 => PrestigeBonus {
            bonus_type: BonusKind::Combat,
            value: 0.03,
        },
        2 => PrestigeBonus {
            bonus_type: BonusKind::Production,
            value: 0.05,
        },
        3 => PrestigeBonus {
            bonus_type: BonusKind::Research,
            value: 0.04,
        },
        _ => PrestigeBonus {
            bonus_type: BonusKind::Resource,
            value: 0.05,
        },
    };
    state.prestige.bonuses.push(bonus);

    // The settlement starts over; the legacy does not.
    state.buildings.clear();
    state.build_queue.clear();
    state.army = crate::state::Army::empty();
    state.research = Research::empty();
    state.active_effects.clear();
    let (current, max, happiness) = INITIAL_POPULATION;
    state.population = Population {
        current,
        max,
        happiness,
    };
    state.resources = INITIAL_RESOURCES.into_iter().collect();
    state.resource_storage = INITIAL_STORAGE.into_iter().collect();
    state.era = 1;

    CommandOutcome::ok_with(
        format!("ascended to prestige level {}", state.prestige.level),
        serde_json::json!({
            "prestigeLevel": state.prestige.level,
            "legacyMultiplier": state.prestige.legacy_multiplier,
        }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
