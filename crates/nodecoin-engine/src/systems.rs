//! Tick systems and the catch-up pipeline.
//!
//! Each tick runs a fixed sequence of systems, in the order of the
//! [`TICK_SYSTEMS`] table. The order is part of the game's semantics and
//! must never vary: a building that completes during the building system at
//! tick `t` cannot produce before tick `t + 1`, because the resource system
//! has already run at `t`.
//!
//! [`process_tick_range`] processes the half-open range `(from, to]`, so
//! `process_tick_range(s, k, k)` is a no-op. State invariants are checked
//! after every tick; a violation is a programming error and aborts the
//! range with a fatal [`EngineError`].

use crate::content::{
    self, ResourceKind, CHOZA, FOOD_PER_POP, BASE_MAX_POPULATION, POP_PER_CHOZA_LEVEL,
};
use crate::formulas;
use crate::state::{PlayerState, TradeStatus, INITIAL_STORAGE, TRADE_HISTORY_LIMIT};
use crate::EngineError;

// ---------------------------------------------------------------------------
// System table
// ---------------------------------------------------------------------------

/// A tick system: a pure transformation of the state at tick `t`.
pub type TickSystemFn = fn(&mut PlayerState, u64);

/// The ten systems, in their fixed execution order.
pub const TICK_SYSTEMS: &[(&str, TickSystemFn)] = &[
    ("resource", resource_system),
    ("population", population_system),
    ("building", building_system),
    ("research", research_system),
    ("event", event_system),
    ("combat_upkeep", combat_upkeep_system),
    ("trade", trade_system),
    ("prestige", prestige_system),
    ("exploration", exploration_system),
    ("mining", mining_system),
];

/// Process every tick in `(from, to]`, in order.
pub fn process_tick_range(state: &mut PlayerState, from: u64, to: u64) -> Result<(), EngineError> {
    for t in (from + 1)..=to.max(from) {
        state.tick = t;
        for (name, system) in TICK_SYSTEMS {
            system(state, t);
            tracing::trace!(tick = t, system = name, "tick system ran");
        }
        state.last_tick_processed = t;
        state.check_invariants()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 1. Resource system
// ---------------------------------------------------------------------------

/// Building production plus population food upkeep.
fn resource_system(state: &mut PlayerState, _tick: u64) {
    let tech_bonus = content::tech_production_bonus(&state.research.completed)
        + state
            .prestige
            .bonuses
            .iter()
            .filter(|b| b.bonus_type == crate::state::BonusKind::Production)
            .map(|b| b.value)
            .sum::<f64>();
    let legacy = state.prestige.legacy_multiplier;

    let mut produced: Vec<(ResourceKind, f64)> = Vec::new();
    for b in state.buildings.iter().filter(|b| b.is_completed()) {
        let Some(def) = content::building(&b.id) else {
            continue;
        };
        for (kind, base) in def.production {
            let amount = formulas::production(
                *base,
                b.level,
                tech_bonus,
                legacy,
                state.biome.modifier(*kind),
            );
            match produced.iter_mut().find(|(k, _)| k == kind) {
                Some((_, acc)) => *acc += amount,
                None => produced.push((*kind, amount)),
            }
        }
    }
    for (kind, amount) in produced {
        state.add_resource(kind, amount.floor() as u64);
    }

    // Population eats.
    let upkeep = state.population.current as u64 * FOOD_PER_POP;
    if !state.remove_resource(ResourceKind::Food, upkeep) {
        state.resources.insert(ResourceKind::Food, 0);
        state.population.happiness = state.population.happiness.saturating_sub(10);
    }
}

// ---------------------------------------------------------------------------
// 2. Population system
// ---------------------------------------------------------------------------

fn population_system(state: &mut PlayerState, _tick: u64) {
    state.population.max =
        BASE_MAX_POPULATION + POP_PER_CHOZA_LEVEL * state.completed_levels(CHOZA);

    // Growth: strictly more food than the growth cost.
    let growth_cost = formulas::food_for_growth(state.population.current);
    if state.resource(ResourceKind::Food) > growth_cost
        && state.population.current < state.population.max
    {
        state.remove_resource(ResourceKind::Food, growth_cost);
        state.population.current += 1;
    }

    // Decline under misery, but never below the survivor floor.
    if state.population.happiness < 20 && state.population.current > 5 {
        state.population.current -= 1;
    }

    // Recompute happiness from scratch.
    let mut happiness: i64 = 50;
    for b in state.buildings.iter().filter(|b| b.is_completed()) {
        if let Some(def) = content::building(&b.id) {
            happiness += def.happiness_bonus as i64 * b.level as i64;
        }
    }
    if state.resource(ResourceKind::Food) < state.storage(ResourceKind::Food) / 2 {
        happiness -= 5;
    }
    if state.population.current > state.population.max {
        happiness -= 10;
    }
    state.population.happiness = happiness.clamp(0, 100) as u32;
}

// ---------------------------------------------------------------------------
// 3. Building system
// ---------------------------------------------------------------------------

fn building_system(state: &mut PlayerState, _tick: u64) {
    for b in &mut state.buildings {
        if b.construction_ticks_remaining > 0 {
            b.construction_ticks_remaining -= 1;
        }
    }

    // Advance the queue; completed entries merge into the building list.
    let mut finished = Vec::new();
    for entry in &mut state.build_queue {
        if entry.construction_ticks_remaining > 0 {
            entry.construction_ticks_remaining -= 1;
        }
        if entry.construction_ticks_remaining == 0 {
            finished.push(entry.clone());
        }
    }
    state
        .build_queue
        .retain(|entry| entry.construction_ticks_remaining > 0);
    for entry in finished {
        state.upsert_building(entry);
    }

    // Storage: base caps plus a uniform bonus from completed buildings.
    let bonus: u64 = state
        .buildings
        .iter()
        .filter(|b| b.is_completed())
        .filter_map(|b| content::building(&b.id).map(|def| def.storage_bonus * b.level as u64))
        .sum();
    for (kind, base) in INITIAL_STORAGE {
        state.resource_storage.insert(kind, base + bonus);
    }
}

// ---------------------------------------------------------------------------
// 4. Research system
// ---------------------------------------------------------------------------

fn research_system(state: &mut PlayerState, _tick: u64) {
    let Some(current) = state.research.current.clone() else {
        return;
    };
    state.research.progress += 1;
    let Some(def) = content::tech(&current) else {
        // Unknown current tech: drop it rather than stall forever.
        tracing::warn!(tech = %current, "dropping unknown in-progress tech");
        state.research.current = None;
        state.research.progress = 0;
        return;
    };
    if state.research.progress >= def.research_ticks {
        state.research.completed.insert(current);
        state.research.current = None;
        state.research.progress = 0;

        // Completing the last tech of the era advances it.
        if state.era < 4
            && content::techs_of_era(state.era).all(|t| state.research.completed.contains(t.id))
        {
            state.era += 1;
            tracing::info!(era = state.era, "era advanced");
        }
    }
}

// ---------------------------------------------------------------------------
// 5. Event system
// ---------------------------------------------------------------------------

fn event_system(state: &mut PlayerState, _tick: u64) {
    for effect in &mut state.active_effects {
        if effect.ticks_remaining > 0 {
            effect.ticks_remaining -= 1;
        }
    }
    state.active_effects.retain(|e| e.ticks_remaining > 0);
}

// ---------------------------------------------------------------------------
// 6. Combat upkeep system
// ---------------------------------------------------------------------------

fn combat_upkeep_system(state: &mut PlayerState, _tick: u64) {
    let required: u64 = state
        .army
        .units
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(kind, count)| *count as u64 * content::unit(*kind).food_per_tick)
        .sum();
    if required == 0 {
        return;
    }
    if state.remove_resource(ResourceKind::Food, required) {
        return;
    }
    // Starvation: whatever food is left is consumed and the weakest unit dies.
    state.resources.insert(ResourceKind::Food, 0);
    for kind in content::kinds_by_ascending_hp() {
        if let Some(count) = state.army.units.get_mut(&kind) {
            if *count > 0 {
                *count -= 1;
                tracing::debug!(unit = %kind, "unit starved");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 7. Trade system
// ---------------------------------------------------------------------------

fn trade_system(state: &mut PlayerState, tick: u64) {
    // Expire and refund.
    let mut refunds = Vec::new();
    for offer in &mut state.trade_offers {
        if offer.status == TradeStatus::Open && offer.expires_at_tick <= tick {
            offer.status = TradeStatus::Expired;
            refunds.push(offer.offering.clone());
        }
    }
    for refund in refunds {
        state.credit_resources(&refund);
    }

    // Bound the history: keep every open offer plus the newest settled ones.
    let settled = state
        .trade_offers
        .iter()
        .filter(|o| o.status != TradeStatus::Open)
        .count();
    if settled > TRADE_HISTORY_LIMIT {
        let mut to_drop = settled - TRADE_HISTORY_LIMIT;
        state.trade_offers.retain(|o| {
            if o.status != TradeStatus::Open && to_drop > 0 {
                to_drop -= 1;
                false
            } else {
                true
            }
        });
    }
}

// ---------------------------------------------------------------------------
// 8. Prestige system
// ---------------------------------------------------------------------------

/// Folds token awards routed by mining into the lifetime earnings counter.
fn prestige_system(state: &mut PlayerState, _tick: u64) {
    if state.pending_prestige_tokens > 0.0 {
        state.prestige.total_tokens_earned += state.pending_prestige_tokens;
        state.pending_prestige_tokens = 0.0;
    }
}

// ---------------------------------------------------------------------------
// 9. Exploration system
// ---------------------------------------------------------------------------

/// Background exploration jobs pass through unchanged; exploration is
/// command-driven.
fn exploration_system(_state: &mut PlayerState, _tick: u64) {}

// ---------------------------------------------------------------------------
// 10. Mining system
// ---------------------------------------------------------------------------

fn mining_system(state: &mut PlayerState, tick: u64) {
    let reward = formulas::halved_mining_reward(tick);
    state.tokens += reward;
    state.pending_prestige_tokens += reward;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
