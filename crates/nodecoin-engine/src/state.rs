//! The player state container.
//!
//! One node owns exactly one [`PlayerState`]. It is a pure data structure:
//! every mutation happens inside a command handler, a tick system, or a
//! dispatched remote-action handler. All keyed collections use `BTreeMap` /
//! `BTreeSet` so serialization order is deterministic; the canonical
//! encoding of this structure is the pre-image of the chain's `stateHash`.
//!
//! Field names serialize in camelCase to match the wire format shared with
//! other node implementations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::content::{Biome, ResourceKind, UnitKind};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Sub-structures
// ---------------------------------------------------------------------------

/// Army posture; scales attack/defense in battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Aggressive,
    Defensive,
    Balanced,
    Guerrilla,
}

/// Diplomatic stance toward one other player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiplomacyStatus {
    Neutral,
    Allied,
    War,
    Peace,
}

/// Lifecycle of a trade offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Accepted,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Population {
    pub current: u32,
    pub max: u32,
    /// Contentment in `[0, 100]`.
    pub happiness: u32,
}

/// A constructed (or under-construction) building instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingInstance {
    pub id: String,
    /// Level in `[1, 10]`.
    pub level: u32,
    /// Zero once the building is completed and producing.
    pub construction_ticks_remaining: u32,
}

impl BuildingInstance {
    pub fn is_completed(&self) -> bool {
        self.construction_ticks_remaining == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Army {
    pub units: BTreeMap<UnitKind, u32>,
    pub strategy: Strategy,
}

impl Army {
    pub fn empty() -> Self {
        Self {
            units: BTreeMap::new(),
            strategy: Strategy::Balanced,
        }
    }

    pub fn total_units(&self) -> u32 {
        self.units.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.units.values().all(|&c| c == 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Research {
    pub completed: BTreeSet<String>,
    pub current: Option<String>,
    pub progress: u32,
}

impl Research {
    pub fn empty() -> Self {
        Self {
            completed: BTreeSet::new(),
            current: None,
            progress: 0,
        }
    }
}

/// A timed modifier from an event or ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    #[serde(rename = "type")]
    pub effect_type: String,
    pub modifier: f64,
    pub ticks_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffer {
    pub id: String,
    pub seller_id: String,
    pub offering: BTreeMap<ResourceKind, u64>,
    pub requesting: BTreeMap<ResourceKind, u64>,
    pub created_at_tick: u64,
    pub expires_at_tick: u64,
    pub status: TradeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alliance {
    pub id: String,
    pub name: String,
    pub leader_id: String,
    pub member_ids: Vec<String>,
    pub created_at_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiplomacyEntry {
    pub target_player_id: String,
    pub status: DiplomacyStatus,
    pub changed_at_tick: u64,
}

/// An espionage report on another settlement. Estimates carry ±20% noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpyReport {
    pub target_id: String,
    pub target_name: String,
    pub era: u8,
    pub estimated_army: BTreeMap<UnitKind, u32>,
    pub estimated_resources: BTreeMap<ResourceKind, u64>,
    pub tick: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusKind {
    Combat,
    Production,
    Research,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrestigeBonus {
    #[serde(rename = "type")]
    pub bonus_type: BonusKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prestige {
    pub level: u32,
    pub legacy_multiplier: f64,
    pub total_tokens_earned: f64,
    pub bonuses: Vec<PrestigeBonus>,
}

impl Prestige {
    pub fn fresh() -> Self {
        Self {
            level: 0,
            legacy_multiplier: 1.0,
            total_tokens_earned: 0.0,
            bonuses: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Initial vector
// ---------------------------------------------------------------------------

/// Starting resources: wood/food/stone/iron/gems/mana.
pub const INITIAL_RESOURCES: [(ResourceKind, u64); 6] = [
    (ResourceKind::Wood, 100),
    (ResourceKind::Food, 100),
    (ResourceKind::Stone, 50),
    (ResourceKind::Iron, 20),
    (ResourceKind::Gems, 5),
    (ResourceKind::Mana, 0),
];

/// Starting storage caps.
pub const INITIAL_STORAGE: [(ResourceKind, u64); 6] = [
    (ResourceKind::Wood, 500),
    (ResourceKind::Food, 500),
    (ResourceKind::Stone, 300),
    (ResourceKind::Iron, 200),
    (ResourceKind::Gems, 100),
    (ResourceKind::Mana, 50),
];

/// Starting token balance.
pub const INITIAL_TOKENS: f64 = 100.0;

/// Starting population: current / max / happiness.
pub const INITIAL_POPULATION: (u32, u32, u32) = (10, 20, 50);

/// How many non-open trade offers the state retains.
pub const TRADE_HISTORY_LIMIT: usize = 20;

/// How many spy reports the state retains.
pub const SPY_REPORT_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// Complete state of one settlement. See the module docs for the mutation
/// discipline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub biome: Biome,
    pub created_at: u64,
    pub tick: u64,
    pub last_tick_processed: u64,
    /// Era in `1..=4`.
    pub era: u8,
    pub tokens: f64,
    pub resources: BTreeMap<ResourceKind, u64>,
    pub resource_storage: BTreeMap<ResourceKind, u64>,
    pub population: Population,
    pub buildings: Vec<BuildingInstance>,
    pub build_queue: Vec<BuildingInstance>,
    pub army: Army,
    pub research: Research,
    pub active_effects: Vec<ActiveEffect>,
    pub trade_offers: Vec<TradeOffer>,
    pub alliance: Option<Alliance>,
    pub diplomacy: Vec<DiplomacyEntry>,
    pub spy_reports: Vec<SpyReport>,
    pub last_spy_tick: Option<u64>,
    pub last_attack_ticks: BTreeMap<String, u64>,
    pub explored_zones: BTreeSet<String>,
    pub claimed_zones: BTreeSet<String>,
    pub prestige: Prestige,
    /// Mining rewards awaiting the prestige system's accounting pass.
    #[serde(default)]
    pub pending_prestige_tokens: f64,
}

impl PlayerState {
    /// Create a brand-new settlement with the fixed initial vector.
    pub fn create_new(id: &str, name: &str, biome: Biome, created_at: u64) -> Self {
        let (current, max, happiness) = INITIAL_POPULATION;
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            biome,
            created_at,
            tick: 0,
            last_tick_processed: 0,
            era: 1,
            tokens: INITIAL_TOKENS,
            resources: INITIAL_RESOURCES.into_iter().collect(),
            resource_storage: INITIAL_STORAGE.into_iter().collect(),
            population: Population {
                current,
                max,
                happiness,
            },
            buildings: Vec::new(),
            build_queue: Vec::new(),
            army: Army::empty(),
            research: Research::empty(),
            active_effects: Vec::new(),
            trade_offers: Vec::new(),
            alliance: None,
            diplomacy: Vec::new(),
            spy_reports: Vec::new(),
            last_spy_tick: None,
            last_attack_ticks: BTreeMap::new(),
            explored_zones: BTreeSet::new(),
            claimed_zones: BTreeSet::new(),
            prestige: Prestige::fresh(),
            pending_prestige_tokens: 0.0,
        }
    }

    // -- resource helpers ---------------------------------------------------

    /// Current amount of one resource.
    pub fn resource(&self, kind: ResourceKind) -> u64 {
        self.resources.get(&kind).copied().unwrap_or(0)
    }

    /// Storage cap for one resource.
    pub fn storage(&self, kind: ResourceKind) -> u64 {
        self.resource_storage.get(&kind).copied().unwrap_or(0)
    }

    /// Add, capping at the storage limit. Returns the amount actually added.
    pub fn add_resource(&mut self, kind: ResourceKind, amount: u64) -> u64 {
        let cap = self.storage(kind);
        let entry = self.resources.entry(kind).or_insert(0);
        let added = amount.min(cap.saturating_sub(*entry));
        *entry += added;
        added
    }

    /// Remove if available; `false` (and no change) on shortfall.
    pub fn remove_resource(&mut self, kind: ResourceKind, amount: u64) -> bool {
        let entry = self.resources.entry(kind).or_insert(0);
        if *entry < amount {
            return false;
        }
        *entry -= amount;
        true
    }

    /// Whether every entry of `cost` is covered.
    pub fn has_resources(&self, cost: &BTreeMap<ResourceKind, u64>) -> bool {
        cost.iter().all(|(kind, amount)| self.resource(*kind) >= *amount)
    }

    /// Deduct all of `cost`, or nothing. Returns `false` on shortfall.
    pub fn deduct_resources(&mut self, cost: &BTreeMap<ResourceKind, u64>) -> bool {
        if !self.has_resources(cost) {
            return false;
        }
        for (kind, amount) in cost {
            let entry = self.resources.entry(*kind).or_insert(0);
            *entry -= amount;
        }
        true
    }

    /// Credit every entry of `gain`, capping each at storage.
    pub fn credit_resources(&mut self, gain: &BTreeMap<ResourceKind, u64>) {
        for (kind, amount) in gain {
            self.add_resource(*kind, *amount);
        }
    }

    // -- building helpers ---------------------------------------------------

    /// Find a building instance by id.
    pub fn building(&self, id: &str) -> Option<&BuildingInstance> {
        self.buildings.iter().find(|b| b.id == id)
    }

    pub fn building_mut(&mut self, id: &str) -> Option<&mut BuildingInstance> {
        self.buildings.iter_mut().find(|b| b.id == id)
    }

    /// Insert or replace a building instance, keyed by id.
    pub fn upsert_building(&mut self, instance: BuildingInstance) {
        match self.building_mut(&instance.id) {
            Some(existing) => *existing = instance,
            None => self.buildings.push(instance),
        }
    }

    /// Summed levels of completed instances of a building id.
    pub fn completed_levels(&self, id: &str) -> u32 {
        self.buildings
            .iter()
            .filter(|b| b.id == id && b.is_completed())
            .map(|b| b.level)
            .sum()
    }

    /// Total defense bonus from completed buildings.
    pub fn building_defense_bonus(&self) -> f64 {
        self.buildings
            .iter()
            .filter(|b| b.is_completed())
            .filter_map(|b| crate::content::building(&b.id).map(|def| def.defense_bonus * b.level as f64))
            .sum()
    }

    // -- trade helpers ------------------------------------------------------

    pub fn trade_offer(&self, id: &str) -> Option<&TradeOffer> {
        self.trade_offers.iter().find(|o| o.id == id)
    }

    pub fn trade_offer_mut(&mut self, id: &str) -> Option<&mut TradeOffer> {
        self.trade_offers.iter_mut().find(|o| o.id == id)
    }

    // -- diplomacy helpers --------------------------------------------------

    /// Insert or update the relation toward `target`.
    pub fn upsert_diplomacy(&mut self, target: &str, status: DiplomacyStatus, tick: u64) {
        match self
            .diplomacy
            .iter_mut()
            .find(|d| d.target_player_id == target)
        {
            Some(entry) => {
                entry.status = status;
                entry.changed_at_tick = tick;
            }
            None => self.diplomacy.push(DiplomacyEntry {
                target_player_id: target.to_owned(),
                status,
                changed_at_tick: tick,
            }),
        }
    }

    // -- serialization ------------------------------------------------------

    /// Serialize to JSON bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(self).map_err(EngineError::from)
    }

    /// Rebuild from JSON bytes produced by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8]) -> Result<Self, EngineError> {
        serde_json::from_slice(bytes).map_err(EngineError::from)
    }

    // -- invariants ----------------------------------------------------------

    /// Validate every structural invariant. A violation here is a programming
    /// error in a tick system or handler and is treated as fatal.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        for (kind, amount) in &self.resources {
            let cap = self.storage(*kind);
            if *amount > cap {
                return Err(EngineError::InvariantViolation {
                    detail: format!("{kind} = {amount} exceeds storage {cap}"),
                });
            }
        }
        // population.current may transiently exceed max (housing demolished);
        // the population system penalises happiness until it declines.
        if self.population.happiness > 100 {
            return Err(EngineError::InvariantViolation {
                detail: format!("happiness {} out of range", self.population.happiness),
            });
        }
        let mut seen_buildings = BTreeSet::new();
        for b in &self.buildings {
            if !seen_buildings.insert(b.id.as_str()) {
                return Err(EngineError::InvariantViolation {
                    detail: format!("duplicate building entry '{}'", b.id),
                });
            }
            if b.level == 0 || b.level > 10 {
                return Err(EngineError::InvariantViolation {
                    detail: format!("building '{}' level {} out of range", b.id, b.level),
                });
            }
        }
        let mut seen_targets = BTreeSet::new();
        for d in &self.diplomacy {
            if !seen_targets.insert(d.target_player_id.as_str()) {
                return Err(EngineError::InvariantViolation {
                    detail: format!("duplicate diplomacy entry for '{}'", d.target_player_id),
                });
            }
        }
        if let Some(current) = &self.research.current {
            if self.research.completed.contains(current) {
                return Err(EngineError::InvariantViolation {
                    detail: format!("researching already-completed tech '{current}'"),
                });
            }
        }
        if let Some(alliance) = &self.alliance {
            if !alliance.member_ids.iter().any(|m| m == &self.id) {
                return Err(EngineError::InvariantViolation {
                    detail: format!("alliance '{}' does not list us as a member", alliance.id),
                });
            }
        }
        if !(1..=4).contains(&self.era) {
            return Err(EngineError::InvariantViolation {
                detail: format!("era {} out of range", self.era),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> PlayerState {
        PlayerState::create_new("p1", "Test", Biome::Forest, 0)
    }

    // -- 1. Initial vector ---------------------------------------------------

    #[test]
    fn create_new_initial_vector() {
        let s = fresh();
        assert_eq!(s.resource(ResourceKind::Wood), 100);
        assert_eq!(s.resource(ResourceKind::Food), 100);
        assert_eq!(s.resource(ResourceKind::Stone), 50);
        assert_eq!(s.resource(ResourceKind::Iron), 20);
        assert_eq!(s.resource(ResourceKind::Gems), 5);
        assert_eq!(s.resource(ResourceKind::Mana), 0);
        assert_eq!(s.storage(ResourceKind::Wood), 500);
        assert_eq!(s.storage(ResourceKind::Mana), 50);
        assert_eq!(s.population.current, 10);
        assert_eq!(s.population.max, 20);
        assert_eq!(s.population.happiness, 50);
        assert_eq!(s.tokens, 100.0);
        assert_eq!(s.era, 1);
        s.check_invariants().unwrap();
    }

    // -- 2. Resource helpers -------------------------------------------------

    #[test]
    fn add_resource_caps_at_storage() {
        let mut s = fresh();
        let added = s.add_resource(ResourceKind::Wood, 1_000);
        assert_eq!(added, 400);
        assert_eq!(s.resource(ResourceKind::Wood), 500);
    }

    #[test]
    fn remove_resource_all_or_nothing() {
        let mut s = fresh();
        assert!(!s.remove_resource(ResourceKind::Gems, 6));
        assert_eq!(s.resource(ResourceKind::Gems), 5);
        assert!(s.remove_resource(ResourceKind::Gems, 5));
        assert_eq!(s.resource(ResourceKind::Gems), 0);
    }

    #[test]
    fn deduct_resources_is_atomic() {
        let mut s = fresh();
        let mut cost = BTreeMap::new();
        cost.insert(ResourceKind::Wood, 50);
        cost.insert(ResourceKind::Mana, 1); // not available
        assert!(!s.deduct_resources(&cost));
        // Nothing was touched.
        assert_eq!(s.resource(ResourceKind::Wood), 100);

        cost.remove(&ResourceKind::Mana);
        assert!(s.deduct_resources(&cost));
        assert_eq!(s.resource(ResourceKind::Wood), 50);
    }

    // -- 3. Building helpers -------------------------------------------------

    #[test]
    fn upsert_building_replaces_by_id() {
        let mut s = fresh();
        s.upsert_building(BuildingInstance {
            id: "choza".into(),
            level: 1,
            construction_ticks_remaining: 3,
        });
        s.upsert_building(BuildingInstance {
            id: "choza".into(),
            level: 2,
            construction_ticks_remaining: 0,
        });
        assert_eq!(s.buildings.len(), 1);
        assert_eq!(s.building("choza").unwrap().level, 2);
        assert_eq!(s.completed_levels("choza"), 2);
    }

    #[test]
    fn under_construction_does_not_count_as_completed() {
        let mut s = fresh();
        s.upsert_building(BuildingInstance {
            id: "choza".into(),
            level: 3,
            construction_ticks_remaining: 1,
        });
        assert_eq!(s.completed_levels("choza"), 0);
    }

    // -- 4. Diplomacy upsert -------------------------------------------------

    #[test]
    fn diplomacy_upsert_keeps_one_entry_per_target() {
        let mut s = fresh();
        s.upsert_diplomacy("p2", DiplomacyStatus::War, 5);
        s.upsert_diplomacy("p2", DiplomacyStatus::Peace, 9);
        assert_eq!(s.diplomacy.len(), 1);
        assert_eq!(s.diplomacy[0].status, DiplomacyStatus::Peace);
        assert_eq!(s.diplomacy[0].changed_at_tick, 9);
        s.check_invariants().unwrap();
    }

    // -- 5. Serialization round-trip ------------------------------------------

    #[test]
    fn serialize_round_trip() {
        let mut s = fresh();
        s.army.units.insert(UnitKind::Soldado, 12);
        s.explored_zones.insert("bosque-norte".into());
        s.upsert_diplomacy("p9", DiplomacyStatus::Allied, 3);
        s.trade_offers.push(TradeOffer {
            id: "p1-0-0".into(),
            seller_id: "p1".into(),
            offering: [(ResourceKind::Wood, 40)].into_iter().collect(),
            requesting: [(ResourceKind::Iron, 10)].into_iter().collect(),
            created_at_tick: 0,
            expires_at_tick: 100,
            status: TradeStatus::Open,
        });
        let bytes = s.serialize().unwrap();
        let back = PlayerState::deserialize(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn serialized_fields_are_camel_case() {
        let s = fresh();
        let v: serde_json::Value = serde_json::from_slice(&s.serialize().unwrap()).unwrap();
        assert!(v.get("lastTickProcessed").is_some());
        assert!(v.get("resourceStorage").is_some());
        assert!(v.get("last_tick_processed").is_none());
    }

    // -- 6. Invariant checks ---------------------------------------------------

    #[test]
    fn invariant_catches_overflowing_resource() {
        let mut s = fresh();
        s.resources.insert(ResourceKind::Wood, 9_999);
        assert!(matches!(
            s.check_invariants(),
            Err(EngineError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn invariant_catches_duplicate_building() {
        let mut s = fresh();
        s.buildings.push(BuildingInstance {
            id: "granja".into(),
            level: 1,
            construction_ticks_remaining: 0,
        });
        s.buildings.push(BuildingInstance {
            id: "granja".into(),
            level: 2,
            construction_ticks_remaining: 0,
        });
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn invariant_catches_researching_completed_tech() {
        let mut s = fresh();
        s.research.completed.insert("agricultura".into());
        s.research.current = Some("agricultura".into());
        assert!(s.check_invariants().is_err());
    }
}
