//! Typed entries of the shared world document.
//!
//! Signed entries carry `signature` and `signedBy` over the canonical
//! encoding of the rest of their fields; see [`crate::signed`]. All entries
//! serialize in camelCase, matching the gossip wire format.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use nodecoin_engine::content::{ResourceKind, UnitKind};
use nodecoin_engine::state::Strategy;

/// How many trade offers the shared board retains.
pub const TRADE_BOARD_LIMIT: usize = 50;

/// How many combat log entries the shared feed retains.
pub const COMBAT_FEED_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Signed entries
// ---------------------------------------------------------------------------

/// A player's standing, published by that player. Signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub name: String,
    pub era: u8,
    pub prestige: u32,
    pub tokens: f64,
    pub total_army: u32,
    pub total_resources: u64,
    pub army_units: BTreeMap<UnitKind, u32>,
    pub strategy: Strategy,
    pub defense_bonus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alliance_name: Option<String>,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub signed_by: String,
}

/// A live trade offer on the shared board. Signed by the seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOfferEntry {
    pub id: String,
    pub from: String,
    pub offer: BTreeMap<ResourceKind, u64>,
    pub want: BTreeMap<ResourceKind, u64>,
    pub created_at: u64,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub signed_by: String,
}

/// An alliance roster. Signed by its leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllianceEntry {
    pub id: String,
    pub name: String,
    pub leader_id: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub signed_by: String,
}

// ---------------------------------------------------------------------------
// Unsigned entries
// ---------------------------------------------------------------------------

/// Zone knowledge: who has seen it, who holds it. Unsigned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneEntry {
    pub discovered_by: BTreeSet<String>,
    pub claimed_by: Option<String>,
}

/// One entry of the rolling combat feed. Unsigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatLogEntry {
    pub attacker: String,
    pub defender: String,
    /// Player id of the winner, or `"draw"`.
    pub winner: String,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_serializes_camel_case() {
        let entry = RankingEntry {
            name: "Alice".into(),
            era: 2,
            prestige: 1,
            tokens: 250.0,
            total_army: 30,
            total_resources: 600,
            army_units: [(UnitKind::Soldado, 30)].into_iter().collect(),
            strategy: Strategy::Balanced,
            defense_bonus: 0.1,
            alliance_id: None,
            alliance_name: None,
            signature: String::new(),
            signed_by: String::new(),
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert!(v.get("totalArmy").is_some());
        assert!(v.get("signedBy").is_some());
        assert!(v.get("allianceId").is_none(), "None fields are omitted");
    }

    #[test]
    fn zone_entry_defaults_empty() {
        let zone = ZoneEntry::default();
        assert!(zone.discovered_by.is_empty());
        assert!(zone.claimed_by.is_none());
        let back: ZoneEntry =
            serde_json::from_str(&serde_json::to_string(&zone).unwrap()).unwrap();
        assert_eq!(back, zone);
    }
}
