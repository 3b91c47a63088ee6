//! Single-round deterministic battle resolution.
//!
//! The resolver is pure in its inputs. Attacker and defender nodes each
//! rebuild the RNG from the shared composite seed
//! (`"pvp-<attackerId>-<defenderId>-<tick>"`) and traverse unit kinds in the
//! canonical order, so both derive the same report independently. The two
//! random factors are drawn in a fixed order: the attacker's damage factor
//! first, then the defender's.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::{self, UnitKind, TRIANGLE_BONUS};
use crate::formulas;
use crate::rng::GameRng;
use crate::state::Strategy;

// ---------------------------------------------------------------------------
// Inputs and report
// ---------------------------------------------------------------------------

/// One side of a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSide {
    pub units: BTreeMap<UnitKind, u32>,
    pub strategy: Strategy,
    /// Fortification bonus; only meaningful for the defender.
    #[serde(default)]
    pub defense_bonus: f64,
}

impl BattleSide {
    pub fn new(units: BTreeMap<UnitKind, u32>, strategy: Strategy) -> Self {
        Self {
            units,
            strategy,
            defense_bonus: 0.0,
        }
    }

    fn total_units(&self) -> u32 {
        self.units.values().sum()
    }

    fn is_empty(&self) -> bool {
        self.total_units() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleWinner {
    Attacker,
    Defender,
    Draw,
}

/// The full outcome of one battle, identical on both nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleReport {
    pub attacker_id: String,
    pub defender_id: String,
    pub winner: BattleWinner,
    pub attacker_losses: BTreeMap<UnitKind, u32>,
    pub defender_losses: BTreeMap<UnitKind, u32>,
    pub damage_to_attacker: f64,
    pub damage_to_defender: f64,
    /// Tokens awarded to the winner; zero on a draw.
    pub loot_tokens: f64,
}

// ---------------------------------------------------------------------------
// Strength computation
// ---------------------------------------------------------------------------

/// Attack strength: `Σ count · (attack + triangle bonus)` where the bonus
/// applies per unit kind strong against any kind the enemy fields.
fn attack_strength(side: &BattleSide, enemy: &BattleSide) -> f64 {
    UnitKind::ALL
        .iter()
        .map(|kind| {
            let count = side.units.get(kind).copied().unwrap_or(0);
            if count == 0 {
                return 0.0;
            }
            let def = content::unit(*kind);
            let countered = def
                .strong_against
                .map(|target| enemy.units.get(&target).copied().unwrap_or(0) > 0)
                .unwrap_or(false);
            let bonus = if countered { TRIANGLE_BONUS } else { 0.0 };
            count as f64 * (def.attack + bonus)
        })
        .sum()
}

fn defense_strength(side: &BattleSide) -> f64 {
    UnitKind::ALL
        .iter()
        .map(|kind| {
            let count = side.units.get(kind).copied().unwrap_or(0);
            count as f64 * content::unit(*kind).defense
        })
        .sum()
}

fn total_hp(side: &BattleSide) -> f64 {
    UnitKind::ALL
        .iter()
        .map(|kind| {
            let count = side.units.get(kind).copied().unwrap_or(0);
            count as f64 * content::unit(*kind).hp
        })
        .sum()
}

/// Strategy multipliers, applied as (attack factor, defense factor).
fn strategy_factors(strategy: Strategy) -> (f64, f64) {
    match strategy {
        Strategy::Aggressive => (1.2, 0.9),
        Strategy::Defensive => (0.9, 1.2),
        Strategy::Balanced | Strategy::Guerrilla => (1.0, 1.0),
    }
}

/// Units lost given damage dealt against a side.
///
/// The lost fraction is `damage / totalHp`, scaled to the side's unit count
/// and clamped.
fn units_lost(damage: f64, side: &BattleSide) -> u32 {
    let hp = total_hp(side);
    if hp <= 0.0 {
        return 0;
    }
    let total = side.total_units();
    let lost = (damage / hp * total as f64).round();
    (lost.max(0.0) as u32).min(total)
}

/// Distribute `losses` casualties over a side's unit kinds, weakest
/// (lowest per-unit HP) first.
fn distribute_casualties(side: &BattleSide, mut losses: u32) -> BTreeMap<UnitKind, u32> {
    let mut out = BTreeMap::new();
    for kind in content::kinds_by_ascending_hp() {
        if losses == 0 {
            break;
        }
        let present = side.units.get(&kind).copied().unwrap_or(0);
        if present == 0 {
            continue;
        }
        let killed = present.min(losses);
        out.insert(kind, killed);
        losses -= killed;
    }
    out
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Tokens looted per unit the loser lost.
pub const LOOT_PER_UNIT: f64 = 5.0;

/// Resolve one battle. See the module docs for the determinism contract.
pub fn resolve_battle(
    attacker: &BattleSide,
    defender: &BattleSide,
    rng: &mut GameRng,
    attacker_id: &str,
    defender_id: &str,
) -> BattleReport {
    let empty_report = |winner: BattleWinner| BattleReport {
        attacker_id: attacker_id.to_owned(),
        defender_id: defender_id.to_owned(),
        winner,
        attacker_losses: BTreeMap::new(),
        defender_losses: BTreeMap::new(),
        damage_to_attacker: 0.0,
        damage_to_defender: 0.0,
        loot_tokens: 0.0,
    };

    match (attacker.is_empty(), defender.is_empty()) {
        (true, true) => return empty_report(BattleWinner::Draw),
        (true, false) => return empty_report(BattleWinner::Defender),
        (false, true) => return empty_report(BattleWinner::Attacker),
        (false, false) => {}
    }

    // 1-3. Strengths with strategy factors and fortification.
    let (att_atk_f, att_def_f) = strategy_factors(attacker.strategy);
    let (def_atk_f, def_def_f) = strategy_factors(defender.strategy);
    let attacker_atk = attack_strength(attacker, defender) * att_atk_f;
    let attacker_def = defense_strength(attacker) * att_def_f;
    let defender_atk = attack_strength(defender, attacker) * def_atk_f;
    let defender_def = defense_strength(defender) * def_def_f * (1.0 + defender.defense_bonus);

    // 4. Damage; attacker's random factor is drawn first.
    let attacker_factor = rng.next_range(0.75, 1.25);
    let defender_factor = rng.next_range(0.75, 1.25);
    let damage_to_defender = formulas::combat_damage(attacker_atk - defender_def, attacker_factor);
    let damage_to_attacker = formulas::combat_damage(defender_atk - attacker_def, defender_factor);

    // 5-6. Casualties, weakest kinds first.
    let attacker_lost = units_lost(damage_to_attacker, attacker);
    let defender_lost = units_lost(damage_to_defender, defender);
    let attacker_losses = distribute_casualties(attacker, attacker_lost);
    let defender_losses = distribute_casualties(defender, defender_lost);

    // 7. Winner.
    let attacker_survivors = attacker.total_units() - attacker_lost;
    let defender_survivors = defender.total_units() - defender_lost;
    let winner = match (attacker_survivors > 0, defender_survivors > 0) {
        (false, false) => BattleWinner::Draw,
        (true, false) => BattleWinner::Attacker,
        (false, true) => BattleWinner::Defender,
        (true, true) => {
            // Both stand: the side that dealt more proportional damage wins.
            let att_proportion = damage_to_defender / total_hp(defender).max(1.0);
            let def_proportion = damage_to_attacker / total_hp(attacker).max(1.0);
            if att_proportion > def_proportion {
                BattleWinner::Attacker
            } else if def_proportion > att_proportion {
                BattleWinner::Defender
            } else {
                BattleWinner::Draw
            }
        }
    };

    // 8. Loot.
    let loot_tokens = match winner {
        BattleWinner::Attacker => LOOT_PER_UNIT * defender_lost as f64,
        BattleWinner::Defender => LOOT_PER_UNIT * attacker_lost as f64,
        BattleWinner::Draw => 0.0,
    };

    BattleReport {
        attacker_id: attacker_id.to_owned(),
        defender_id: defender_id.to_owned(),
        winner,
        attacker_losses,
        defender_losses,
        damage_to_attacker,
        damage_to_defender,
        loot_tokens,
    }
}

/// The composite RNG seed both sides of a PvP battle derive.
pub fn pvp_seed(attacker_id: &str, defender_id: &str, tick: u64) -> String {
    format!("pvp-{attacker_id}-{defender_id}-{tick}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
