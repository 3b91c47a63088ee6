//! Static game content: resources, biomes, buildings, units, techs, zones
//! and NPC camps.
//!
//! The catalog is data, not behavior. Tick systems and command handlers look
//! definitions up here and apply the formulas from [`crate::formulas`]; no
//! balance number lives anywhere else. Unit kinds have one canonical order
//! ([`UnitKind::ALL`]) that every iteration over armies must follow, so both
//! sides of a battle traverse identically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ResourceKind
// ---------------------------------------------------------------------------

/// The six resource kinds a settlement stockpiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Wood,
    Food,
    Stone,
    Iron,
    Gems,
    Mana,
}

impl ResourceKind {
    /// Canonical iteration order for resource maps.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Wood,
        ResourceKind::Food,
        ResourceKind::Stone,
        ResourceKind::Iron,
        ResourceKind::Gems,
        ResourceKind::Mana,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Wood => "wood",
            ResourceKind::Food => "food",
            ResourceKind::Stone => "stone",
            ResourceKind::Iron => "iron",
            ResourceKind::Gems => "gems",
            ResourceKind::Mana => "mana",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Biome
// ---------------------------------------------------------------------------

/// Settlement biome; fixed at creation, modifies production per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Biome {
    Plains,
    Forest,
    Mountain,
    Desert,
    Coast,
    Volcanic,
}

impl Biome {
    pub const ALL: [Biome; 6] = [
        Biome::Plains,
        Biome::Forest,
        Biome::Mountain,
        Biome::Desert,
        Biome::Coast,
        Biome::Volcanic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Biome::Plains => "plains",
            Biome::Forest => "forest",
            Biome::Mountain => "mountain",
            Biome::Desert => "desert",
            Biome::Coast => "coast",
            Biome::Volcanic => "volcanic",
        }
    }

    /// Production multiplier this biome applies to a resource kind.
    pub fn modifier(&self, resource: ResourceKind) -> f64 {
        use Biome::*;
        use ResourceKind::*;
        match (self, resource) {
            (Plains, Food) => 1.2,
            (Forest, Wood) => 1.25,
            (Mountain, Stone) => 1.3,
            (Mountain, Iron) => 1.1,
            (Desert, Gems) => 1.2,
            (Desert, Food) => 0.8,
            (Coast, Food) => 1.1,
            (Coast, Wood) => 1.05,
            (Volcanic, Mana) => 1.2,
            (Volcanic, Iron) => 1.2,
            (Volcanic, Food) => 0.7,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Biome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plains" => Ok(Biome::Plains),
            "forest" => Ok(Biome::Forest),
            "mountain" => Ok(Biome::Mountain),
            "desert" => Ok(Biome::Desert),
            "coast" => Ok(Biome::Coast),
            "volcanic" => Ok(Biome::Volcanic),
            other => Err(format!("unknown biome '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// UnitKind
// ---------------------------------------------------------------------------

/// The seven unit kinds. [`UnitKind::ALL`] is the canonical traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Soldado,
    Arquero,
    Lancero,
    Caballeria,
    Catapulta,
    Espia,
    Mago,
}

impl UnitKind {
    pub const ALL: [UnitKind; 7] = [
        UnitKind::Soldado,
        UnitKind::Arquero,
        UnitKind::Lancero,
        UnitKind::Caballeria,
        UnitKind::Catapulta,
        UnitKind::Espia,
        UnitKind::Mago,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Soldado => "soldado",
            UnitKind::Arquero => "arquero",
            UnitKind::Lancero => "lancero",
            UnitKind::Caballeria => "caballeria",
            UnitKind::Catapulta => "catapulta",
            UnitKind::Espia => "espia",
            UnitKind::Mago => "mago",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Flat attack bonus a unit gains against a kind it counters.
pub const TRIANGLE_BONUS: f64 = 2.0;

/// Base maximum population before housing.
pub const BASE_MAX_POPULATION: u32 = 20;

/// Extra maximum population per completed choza level.
pub const POP_PER_CHOZA_LEVEL: u32 = 5;

/// Food each population member consumes per tick.
pub const FOOD_PER_POP: u64 = 2;

/// Building id of the housing building the population system keys on.
pub const CHOZA: &str = "choza";

/// Building id of the barracks required to recruit units.
pub const CUARTEL: &str = "cuartel";

/// Static definition of one building kind.
#[derive(Debug, Clone)]
pub struct BuildingDef {
    pub id: &'static str,
    pub name: &'static str,
    /// Era required to construct (1..=4).
    pub era: u8,
    /// Base cost at level 0; later levels grow by [`crate::formulas::COST_GROWTH`].
    pub cost: &'static [(ResourceKind, u64)],
    pub construction_ticks: u32,
    pub max_level: u32,
    /// Per-tick base production while completed.
    pub production: &'static [(ResourceKind, f64)],
    /// Added to every resource cap, per level.
    pub storage_bonus: u64,
    /// Added to recomputed happiness, per level.
    pub happiness_bonus: i32,
    /// Added to the settlement's defense bonus, per level.
    pub defense_bonus: f64,
    /// Tech that must be completed before construction, if any.
    pub requires_tech: Option<&'static str>,
}

/// Static definition of one unit kind.
#[derive(Debug, Clone)]
pub struct UnitDef {
    pub kind: UnitKind,
    pub era: u8,
    pub attack: f64,
    pub defense: f64,
    pub hp: f64,
    pub food_per_tick: u64,
    pub cost: &'static [(ResourceKind, u64)],
    /// Combat-triangle target: countered kind, if any.
    pub strong_against: Option<UnitKind>,
}

/// Static definition of one technology.
#[derive(Debug, Clone)]
pub struct TechDef {
    pub id: &'static str,
    pub name: &'static str,
    pub era: u8,
    pub research_ticks: u32,
    pub cost: &'static [(ResourceKind, u64)],
    pub prerequisites: &'static [&'static str],
    /// Additive global production bonus once completed.
    pub production_bonus: f64,
    /// Additive combat strength bonus once completed.
    pub combat_bonus: f64,
}

/// A fixed NPC camp the player can raid.
#[derive(Debug, Clone)]
pub struct NpcTarget {
    pub id: &'static str,
    pub army: &'static [(UnitKind, u32)],
    pub reward_tokens: f64,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

pub const BUILDINGS: &[BuildingDef] = &[
    BuildingDef {
        id: "choza",
        name: "Choza",
        era: 1,
        cost: &[(ResourceKind::Wood, 20), (ResourceKind::Food, 10)],
        construction_ticks: 3,
        max_level: 10,
        production: &[],
        storage_bonus: 0,
        happiness_bonus: 1,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "granja",
        name: "Granja",
        era: 1,
        cost: &[(ResourceKind::Wood, 25)],
        construction_ticks: 3,
        max_level: 10,
        production: &[(ResourceKind::Food, 6.0)],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "aserradero",
        name: "Aserradero",
        era: 1,
        cost: &[(ResourceKind::Wood, 15), (ResourceKind::Stone, 5)],
        construction_ticks: 3,
        max_level: 10,
        production: &[(ResourceKind::Wood, 5.0)],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "cantera",
        name: "Cantera",
        era: 1,
        cost: &[(ResourceKind::Wood, 30), (ResourceKind::Food, 10)],
        construction_ticks: 4,
        max_level: 10,
        production: &[(ResourceKind::Stone, 3.0)],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "almacen",
        name: "Almacen",
        era: 1,
        cost: &[(ResourceKind::Wood, 30), (ResourceKind::Stone, 10)],
        construction_ticks: 4,
        max_level: 10,
        production: &[],
        storage_bonus: 100,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "mina",
        name: "Mina",
        era: 2,
        cost: &[(ResourceKind::Wood, 40), (ResourceKind::Stone, 30)],
        construction_ticks: 5,
        max_level: 10,
        production: &[(ResourceKind::Iron, 2.0)],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "cuartel",
        name: "Cuartel",
        era: 2,
        cost: &[(ResourceKind::Wood, 50), (ResourceKind::Stone, 40)],
        construction_ticks: 5,
        max_level: 10,
        production: &[],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "mercado",
        name: "Mercado",
        era: 2,
        cost: &[(ResourceKind::Wood, 60), (ResourceKind::Stone, 20)],
        construction_ticks: 4,
        max_level: 10,
        production: &[],
        storage_bonus: 0,
        happiness_bonus: 5,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "muralla",
        name: "Muralla",
        era: 2,
        cost: &[(ResourceKind::Stone, 50), (ResourceKind::Wood, 20)],
        construction_ticks: 5,
        max_level: 10,
        production: &[],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.05,
        requires_tech: None,
    },
    BuildingDef {
        id: "biblioteca",
        name: "Biblioteca",
        era: 2,
        cost: &[(ResourceKind::Wood, 45), (ResourceKind::Stone, 25)],
        construction_ticks: 4,
        max_level: 10,
        production: &[],
        storage_bonus: 0,
        happiness_bonus: 2,
        defense_bonus: 0.0,
        requires_tech: Some("escritura"),
    },
    BuildingDef {
        id: "templo",
        name: "Templo",
        era: 3,
        cost: &[(ResourceKind::Stone, 80), (ResourceKind::Gems, 5)],
        construction_ticks: 6,
        max_level: 10,
        production: &[],
        storage_bonus: 0,
        happiness_bonus: 10,
        defense_bonus: 0.0,
        requires_tech: None,
    },
    BuildingDef {
        id: "torre-arcana",
        name: "Torre Arcana",
        era: 4,
        cost: &[(ResourceKind::Stone, 100), (ResourceKind::Gems, 20)],
        construction_ticks: 8,
        max_level: 10,
        production: &[(ResourceKind::Mana, 1.0)],
        storage_bonus: 0,
        happiness_bonus: 0,
        defense_bonus: 0.0,
        requires_tech: None,
    },
];

pub const UNITS: &[UnitDef] = &[
    UnitDef {
        kind: UnitKind::Soldado,
        era: 1,
        attack: 5.0,
        defense: 4.0,
        hp: 20.0,
        food_per_tick: 1,
        cost: &[(ResourceKind::Food, 20), (ResourceKind::Iron, 5)],
        strong_against: Some(UnitKind::Arquero),
    },
    UnitDef {
        kind: UnitKind::Arquero,
        era: 1,
        attack: 6.0,
        defense: 2.0,
        hp: 12.0,
        food_per_tick: 1,
        cost: &[(ResourceKind::Food, 15), (ResourceKind::Wood, 10)],
        strong_against: Some(UnitKind::Lancero),
    },
    UnitDef {
        kind: UnitKind::Lancero,
        era: 1,
        attack: 4.0,
        defense: 5.0,
        hp: 16.0,
        food_per_tick: 1,
        cost: &[(ResourceKind::Food, 15), (ResourceKind::Wood, 8)],
        strong_against: Some(UnitKind::Caballeria),
    },
    UnitDef {
        kind: UnitKind::Caballeria,
        era: 2,
        attack: 8.0,
        defense: 3.0,
        hp: 30.0,
        food_per_tick: 2,
        cost: &[(ResourceKind::Food, 40), (ResourceKind::Iron, 10)],
        strong_against: Some(UnitKind::Soldado),
    },
    UnitDef {
        kind: UnitKind::Catapulta,
        era: 3,
        attack: 12.0,
        defense: 1.0,
        hp: 40.0,
        food_per_tick: 3,
        cost: &[(ResourceKind::Wood, 60), (ResourceKind::Iron, 25)],
        strong_against: None,
    },
    UnitDef {
        kind: UnitKind::Espia,
        era: 2,
        attack: 1.0,
        defense: 1.0,
        hp: 6.0,
        food_per_tick: 1,
        cost: &[(ResourceKind::Food, 25), (ResourceKind::Gems, 2)],
        strong_against: None,
    },
    UnitDef {
        kind: UnitKind::Mago,
        era: 4,
        attack: 9.0,
        defense: 2.0,
        hp: 14.0,
        food_per_tick: 2,
        cost: &[(ResourceKind::Food, 30), (ResourceKind::Mana, 5)],
        strong_against: Some(UnitKind::Catapulta),
    },
];

pub const TECHS: &[TechDef] = &[
    // Era 1
    TechDef {
        id: "agricultura",
        name: "Agricultura",
        era: 1,
        research_ticks: 5,
        cost: &[(ResourceKind::Food, 30)],
        prerequisites: &[],
        production_bonus: 0.05,
        combat_bonus: 0.0,
    },
    TechDef {
        id: "herramientas",
        name: "Herramientas",
        era: 1,
        research_ticks: 6,
        cost: &[(ResourceKind::Wood, 40), (ResourceKind::Stone, 15)],
        prerequisites: &[],
        production_bonus: 0.05,
        combat_bonus: 0.0,
    },
    TechDef {
        id: "escritura",
        name: "Escritura",
        era: 1,
        research_ticks: 8,
        cost: &[(ResourceKind::Wood, 30), (ResourceKind::Food, 20)],
        prerequisites: &["herramientas"],
        production_bonus: 0.0,
        combat_bonus: 0.0,
    },
    // Era 2
    TechDef {
        id: "herreria",
        name: "Herreria",
        era: 2,
        research_ticks: 10,
        cost: &[(ResourceKind::Iron, 30), (ResourceKind::Stone, 30)],
        prerequisites: &["herramientas"],
        production_bonus: 0.0,
        combat_bonus: 0.05,
    },
    TechDef {
        id: "moneda",
        name: "Moneda",
        era: 2,
        research_ticks: 10,
        cost: &[(ResourceKind::Gems, 10), (ResourceKind::Stone, 20)],
        prerequisites: &["escritura"],
        production_bonus: 0.05,
        combat_bonus: 0.0,
    },
    TechDef {
        id: "tacticas",
        name: "Tacticas",
        era: 2,
        research_ticks: 12,
        cost: &[(ResourceKind::Food, 50), (ResourceKind::Iron, 20)],
        prerequisites: &["herreria"],
        production_bonus: 0.0,
        combat_bonus: 0.08,
    },
    // Era 3
    TechDef {
        id: "ingenieria",
        name: "Ingenieria",
        era: 3,
        research_ticks: 15,
        cost: &[(ResourceKind::Stone, 80), (ResourceKind::Iron, 40)],
        prerequisites: &["herreria"],
        production_bonus: 0.08,
        combat_bonus: 0.0,
    },
    TechDef {
        id: "navegacion",
        name: "Navegacion",
        era: 3,
        research_ticks: 15,
        cost: &[(ResourceKind::Wood, 100), (ResourceKind::Food, 60)],
        prerequisites: &["moneda"],
        production_bonus: 0.05,
        combat_bonus: 0.0,
    },
    TechDef {
        id: "alquimia",
        name: "Alquimia",
        era: 3,
        research_ticks: 18,
        cost: &[(ResourceKind::Gems, 25), (ResourceKind::Iron, 30)],
        prerequisites: &["ingenieria"],
        production_bonus: 0.0,
        combat_bonus: 0.05,
    },
    // Era 4
    TechDef {
        id: "arcanismo",
        name: "Arcanismo",
        era: 4,
        research_ticks: 20,
        cost: &[(ResourceKind::Mana, 20), (ResourceKind::Gems, 30)],
        prerequisites: &["alquimia"],
        production_bonus: 0.10,
        combat_bonus: 0.05,
    },
    TechDef {
        id: "imprenta",
        name: "Imprenta",
        era: 4,
        research_ticks: 20,
        cost: &[(ResourceKind::Wood, 150), (ResourceKind::Iron, 50)],
        prerequisites: &["navegacion"],
        production_bonus: 0.10,
        combat_bonus: 0.0,
    },
    TechDef {
        id: "balistica",
        name: "Balistica",
        era: 4,
        research_ticks: 22,
        cost: &[(ResourceKind::Iron, 80), (ResourceKind::Stone, 80)],
        prerequisites: &["alquimia"],
        production_bonus: 0.0,
        combat_bonus: 0.10,
    },
];

pub const NPC_TARGETS: &[NpcTarget] = &[
    NpcTarget {
        id: "bandits",
        army: &[(UnitKind::Soldado, 5), (UnitKind::Arquero, 3)],
        reward_tokens: 50.0,
    },
    NpcTarget {
        id: "raiders",
        army: &[(UnitKind::Soldado, 12), (UnitKind::Caballeria, 4)],
        reward_tokens: 150.0,
    },
    NpcTarget {
        id: "dragon",
        army: &[
            (UnitKind::Caballeria, 20),
            (UnitKind::Mago, 10),
            (UnitKind::Catapulta, 5),
        ],
        reward_tokens: 500.0,
    },
];

/// The explorable world map.
pub const ZONES: &[&str] = &[
    "bosque-norte",
    "bosque-sur",
    "llanura-central",
    "llanura-alta",
    "colinas-rojas",
    "colinas-grises",
    "desierto-dorado",
    "desierto-blanco",
    "costa-este",
    "costa-oeste",
    "cienaga",
    "tundra",
    "volcan-dormido",
    "cuevas-profundas",
    "valle-escondido",
    "ruinas-antiguas",
];

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Find a building definition by id.
pub fn building(id: &str) -> Option<&'static BuildingDef> {
    BUILDINGS.iter().find(|b| b.id == id)
}

/// Find a unit definition.
pub fn unit(kind: UnitKind) -> &'static UnitDef {
    UNITS
        .iter()
        .find(|u| u.kind == kind)
        .expect("every UnitKind has a definition")
}

/// Find a tech definition by id.
pub fn tech(id: &str) -> Option<&'static TechDef> {
    TECHS.iter().find(|t| t.id == id)
}

/// Find an NPC camp by id.
pub fn npc_target(id: &str) -> Option<&'static NpcTarget> {
    NPC_TARGETS.iter().find(|n| n.id == id)
}

/// Whether a zone id names a real zone.
pub fn zone_exists(id: &str) -> bool {
    ZONES.contains(&id)
}

/// All techs gating the given era.
pub fn techs_of_era(era: u8) -> impl Iterator<Item = &'static TechDef> {
    TECHS.iter().filter(move |t| t.era == era)
}

/// Summed additive production bonus over a set of completed techs.
pub fn tech_production_bonus(completed: &BTreeSet<String>) -> f64 {
    TECHS
        .iter()
        .filter(|t| completed.contains(t.id))
        .map(|t| t.production_bonus)
        .sum()
}

/// Summed additive combat bonus over a set of completed techs.
pub fn tech_combat_bonus(completed: &BTreeSet<String>) -> f64 {
    TECHS
        .iter()
        .filter(|t| completed.contains(t.id))
        .map(|t| t.combat_bonus)
        .sum()
}

/// Unit kinds present in an army, ordered by ascending per-unit HP.
///
/// Casualties are always distributed in this order (weakest first).
pub fn kinds_by_ascending_hp() -> Vec<UnitKind> {
    let mut kinds: Vec<UnitKind> = UnitKind::ALL.to_vec();
    kinds.sort_by(|a, b| {
        unit(*a)
            .hp
            .partial_cmp(&unit(*b).hp)
            .expect("unit hp is finite")
    });
    kinds
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_unit_kind_defined_once() {
        for kind in UnitKind::ALL {
            assert_eq!(UNITS.iter().filter(|u| u.kind == kind).count(), 1, "{kind}");
        }
    }

    #[test]
    fn building_ids_unique() {
        for b in BUILDINGS {
            assert_eq!(
                BUILDINGS.iter().filter(|o| o.id == b.id).count(),
                1,
                "duplicate building id {}",
                b.id
            );
        }
    }

    #[test]
    fn tech_prerequisites_exist_and_precede() {
        for t in TECHS {
            for pre in t.prerequisites {
                let p = tech(pre).unwrap_or_else(|| panic!("{}: unknown prereq {pre}", t.id));
                assert!(p.era <= t.era, "{} prereq {} from later era", t.id, pre);
            }
        }
    }

    #[test]
    fn choza_matches_population_constants() {
        let choza = building(CHOZA).expect("choza defined");
        assert_eq!(choza.cost, &[(ResourceKind::Wood, 20), (ResourceKind::Food, 10)]);
        assert_eq!(choza.construction_ticks, 3);
    }

    #[test]
    fn cuartel_is_era_two() {
        assert_eq!(building(CUARTEL).expect("cuartel defined").era, 2);
    }

    #[test]
    fn combat_triangle_closes_over_defined_kinds() {
        for u in UNITS {
            if let Some(target) = u.strong_against {
                assert!(UnitKind::ALL.contains(&target), "{}: bad triangle target", u.kind);
                assert_ne!(target, u.kind);
            }
        }
    }

    #[test]
    fn ascending_hp_order() {
        let kinds = kinds_by_ascending_hp();
        assert_eq!(kinds.len(), 7);
        for pair in kinds.windows(2) {
            assert!(unit(pair[0]).hp <= unit(pair[1]).hp);
        }
        assert_eq!(kinds[0], UnitKind::Espia);
        assert_eq!(*kinds.last().unwrap(), UnitKind::Catapulta);
    }

    #[test]
    fn npc_targets_are_the_canonical_three() {
        let ids: Vec<&str> = NPC_TARGETS.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["bandits", "raiders", "dragon"]);
    }

    #[test]
    fn biome_modifier_defaults_to_identity() {
        assert_eq!(Biome::Plains.modifier(ResourceKind::Mana), 1.0);
        assert_eq!(Biome::Forest.modifier(ResourceKind::Wood), 1.25);
        assert_eq!(Biome::Volcanic.modifier(ResourceKind::Food), 0.7);
    }

    #[test]
    fn biome_parses_all_flag_values() {
        for b in Biome::ALL {
            assert_eq!(b.as_str().parse::<Biome>().unwrap(), b);
        }
        assert!("swamp".parse::<Biome>().is_err());
    }

    #[test]
    fn zones_unique() {
        let mut seen = std::collections::HashSet::new();
        for z in ZONES {
            assert!(seen.insert(z), "duplicate zone {z}");
        }
    }
}
