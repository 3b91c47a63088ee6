//! Authoritative balance formulas.
//!
//! Every number the simulation produces funnels through one of these
//! functions. They are pure and individually tested; tick systems and
//! command handlers must not inline their own variants.

/// Per-tick production of one building.
///
/// `base · level · (1 + tech_bonus) · legacy · biome`
pub fn production(base: f64, level: u32, tech_bonus: f64, legacy: f64, biome: f64) -> f64 {
    base * level as f64 * (1.0 + tech_bonus) * legacy * biome
}

/// Cost of building or upgrading to the next level.
///
/// `ceil(base_cost · mult^level)`; `level` is the CURRENT level (0 for a new
/// build), so a fresh construction costs exactly the base cost.
pub fn building_cost(base_cost: u64, level: u32, mult: f64) -> u64 {
    (base_cost as f64 * mult.powi(level as i32)).ceil() as u64
}

/// Default per-level cost growth multiplier.
pub const COST_GROWTH: f64 = 1.15;

/// Food required for the population to grow by one.
pub fn food_for_growth(pop: u32) -> u64 {
    if pop == 0 {
        return 15;
    }
    let p = (pop - 1) as f64;
    (15.0 + 8.0 * p + p.powf(1.5)).ceil() as u64
}

/// Amenities (service buildings) required to keep a population content.
pub fn required_amenities(pop: u32) -> u32 {
    (pop as f64 / 2.0).ceil() as u32
}

/// Battle damage from a strength differential and a random factor.
///
/// `round(30 · 2^(diff/17) · rnd)`
pub fn combat_damage(strength_diff: f64, rnd: f64) -> f64 {
    (30.0 * (strength_diff / 17.0).exp2() * rnd).round()
}

/// Surviving strength after a one-sided engagement (Lanchester-style).
pub fn survivors(winner: f64, loser: f64) -> f64 {
    if winner <= loser {
        0.0
    } else {
        (winner * winner - loser * loser).sqrt().round()
    }
}

/// Transaction fee at the given rate, rounded up to cents.
pub fn transaction_fee(amount: f64, rate: f64) -> f64 {
    (amount * rate * 100.0).ceil() / 100.0
}

/// Default trade fee rate.
pub const FEE_RATE: f64 = 0.03;

/// Permanent production multiplier earned through ascension.
pub fn legacy_multiplier(prestige_level: u32, bonus_per_level: f64) -> f64 {
    1.0 + prestige_level as f64 * bonus_per_level
}

/// Legacy bonus granted per prestige level.
pub const LEGACY_BONUS_PER_LEVEL: f64 = 0.10;

/// Mining reward scaled by validation work and node uptime.
pub fn mining_reward(base: f64, validation_bonus: f64, uptime: f64) -> f64 {
    base * (1.0 + validation_bonus) * uptime
}

/// Base token reward per mined tick, before halving.
pub const MINING_BASE_REWARD: f64 = 0.5;

/// Number of ticks between reward halvings.
pub const HALVING_INTERVAL: u64 = 1_000;

/// Reward for mining tick `t`, after halving.
pub fn halved_mining_reward(t: u64) -> f64 {
    MINING_BASE_REWARD / 2u64.pow((t / HALVING_INTERVAL).min(62) as u32) as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
