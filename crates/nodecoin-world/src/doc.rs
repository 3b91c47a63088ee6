//! The automerge-backed world document.
//!
//! Five top-level containers: `rankings`, `zones`, `alliances` (maps keyed by
//! id) and `tradeOffers`, `combatLogs` (bounded lists). Entry values are
//! stored as canonical-JSON strings: a map key then resolves last-writer-wins
//! as one unit, and the string is byte-stable for signature verification.
//!
//! All mutation helpers go through this wrapper; nothing else touches the
//! automerge API.

use std::collections::BTreeMap;

use automerge::{transaction::Transactable, AutoCommit, Change, ChangeHash, ObjType, ReadDoc, ROOT};

use nodecoin_chain::canonical::canonical_encode;

use crate::entries::{
    AllianceEntry, CombatLogEntry, RankingEntry, TradeOfferEntry, ZoneEntry, COMBAT_FEED_LIMIT,
    TRADE_BOARD_LIMIT,
};
use crate::WorldError;

const RANKINGS: &str = "rankings";
const ZONES: &str = "zones";
const TRADE_OFFERS: &str = "tradeOffers";
const COMBAT_LOGS: &str = "combatLogs";
const ALLIANCES: &str = "alliances";

// ---------------------------------------------------------------------------
// WorldDoc
// ---------------------------------------------------------------------------

/// Wrapper owning one automerge document.
pub struct WorldDoc {
    doc: AutoCommit,
}

impl WorldDoc {
    /// A fresh document with all containers present.
    pub fn new() -> Result<Self, WorldError> {
        let mut doc = AutoCommit::new();
        doc.put_object(ROOT, RANKINGS, ObjType::Map)?;
        doc.put_object(ROOT, ZONES, ObjType::Map)?;
        doc.put_object(ROOT, TRADE_OFFERS, ObjType::List)?;
        doc.put_object(ROOT, COMBAT_LOGS, ObjType::List)?;
        doc.put_object(ROOT, ALLIANCES, ObjType::Map)?;
        Ok(Self { doc })
    }

    /// Load a document from saved bytes.
    pub fn load(bytes: &[u8]) -> Result<Self, WorldError> {
        Ok(Self {
            doc: AutoCommit::load(bytes)?,
        })
    }

    /// Serialize the full document.
    pub fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// An independent copy sharing this document's history.
    pub fn fork(&mut self) -> Self {
        Self {
            doc: self.doc.fork(),
        }
    }

    /// Current heads, identifying everything this document has seen.
    pub fn heads(&mut self) -> Vec<ChangeHash> {
        self.doc.get_heads()
    }

    /// Raw change blobs produced since `since` (e.g. the heads at the last
    /// broadcast).
    pub fn changes_since(&mut self, since: &[ChangeHash]) -> Vec<Vec<u8>> {
        self.doc
            .get_changes(since)
            .into_iter()
            .map(|c| c.raw_bytes().to_vec())
            .collect()
    }

    /// Apply raw change blobs received from a peer. Returns how many applied.
    pub fn apply_encoded_changes(&mut self, blobs: &[Vec<u8>]) -> Result<usize, WorldError> {
        let mut changes = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let change = Change::from_bytes(blob.clone())
                .map_err(|e| WorldError::MalformedChange(e.to_string()))?;
            changes.push(change);
        }
        let count = changes.len();
        self.doc.apply_changes(changes)?;
        Ok(count)
    }

    /// CRDT merge with a document sharing our history. Only sound for forks
    /// of the same lineage; unrelated peers go through the signed rebuild.
    pub fn merge(&mut self, other: &mut WorldDoc) -> Result<(), WorldError> {
        self.doc.merge(&mut other.doc)?;
        Ok(())
    }

    // -- internals -----------------------------------------------------------

    fn map_id(&mut self, name: &'static str) -> Result<automerge::ObjId, WorldError> {
        match self.doc.get(ROOT, name)? {
            Some((_, id)) => Ok(id),
            // A remote full document always carries its containers; create on
            // demand so a degenerate payload cannot wedge the node.
            None => Ok(self.doc.put_object(ROOT, name, ObjType::Map)?),
        }
    }

    fn list_id(&mut self, name: &'static str) -> Result<automerge::ObjId, WorldError> {
        match self.doc.get(ROOT, name)? {
            Some((_, id)) => Ok(id),
            None => Ok(self.doc.put_object(ROOT, name, ObjType::List)?),
        }
    }

    fn put_map_entry(
        &mut self,
        container: &'static str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), WorldError> {
        let id = self.map_id(container)?;
        self.doc.put(&id, key, canonical_encode(value))?;
        Ok(())
    }

    fn map_entry_raw(
        &mut self,
        container: &'static str,
        key: &str,
    ) -> Result<Option<String>, WorldError> {
        let id = self.map_id(container)?;
        Ok(self
            .doc
            .get(&id, key)?
            .and_then(|(value, _)| value.to_str().map(str::to_owned)))
    }

    fn map_entries_raw(
        &mut self,
        container: &'static str,
    ) -> Result<Vec<(String, String)>, WorldError> {
        let id = self.map_id(container)?;
        let keys: Vec<String> = self.doc.keys(&id).collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((value, _)) = self.doc.get(&id, key.as_str())? {
                if let Some(s) = value.to_str() {
                    out.push((key, s.to_owned()));
                }
            }
        }
        Ok(out)
    }

    fn list_entries_raw(&mut self, container: &'static str) -> Result<Vec<String>, WorldError> {
        let id = self.list_id(container)?;
        let len = self.doc.length(&id);
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            if let Some((value, _)) = self.doc.get(&id, i)? {
                if let Some(s) = value.to_str() {
                    out.push(s.to_owned());
                }
            }
        }
        Ok(out)
    }

    fn push_list_entry(
        &mut self,
        container: &'static str,
        value: &serde_json::Value,
        limit: usize,
    ) -> Result<(), WorldError> {
        let id = self.list_id(container)?;
        let len = self.doc.length(&id);
        self.doc.insert(&id, len, canonical_encode(value))?;
        // Trim the oldest entries beyond the bound.
        while self.doc.length(&id) > limit {
            self.doc.delete(&id, 0)?;
        }
        Ok(())
    }

    // -- rankings ------------------------------------------------------------

    /// Publish (or overwrite) a player's ranking entry.
    pub fn update_ranking(&mut self, player_id: &str, entry: &RankingEntry) -> Result<(), WorldError> {
        let value = serde_json::to_value(entry)?;
        self.put_map_entry(RANKINGS, player_id, &value)
    }

    /// One player's ranking, parsed.
    pub fn ranking(&mut self, player_id: &str) -> Result<Option<RankingEntry>, WorldError> {
        match self.map_entry_raw(RANKINGS, player_id)? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    /// All rankings, parsed; malformed entries are skipped.
    pub fn rankings(&mut self) -> Result<BTreeMap<String, RankingEntry>, WorldError> {
        let mut out = BTreeMap::new();
        for (key, raw) in self.map_entries_raw(RANKINGS)? {
            match serde_json::from_str(&raw) {
                Ok(entry) => {
                    out.insert(key, entry);
                }
                Err(e) => tracing::warn!(player = %key, error = %e, "skipping malformed ranking"),
            }
        }
        Ok(out)
    }

    /// Raw ranking payloads, for signature verification during rebuild.
    pub fn rankings_raw(&mut self) -> Result<Vec<(String, String)>, WorldError> {
        self.map_entries_raw(RANKINGS)
    }

    // -- zones ---------------------------------------------------------------

    /// Union-add a discoverer to a zone.
    pub fn add_zone_discovery(&mut self, zone_id: &str, player_id: &str) -> Result<(), WorldError> {
        let mut zone = self.zone(zone_id)?.unwrap_or_default();
        zone.discovered_by.insert(player_id.to_owned());
        let value = serde_json::to_value(&zone)?;
        self.put_map_entry(ZONES, zone_id, &value)
    }

    /// Claim a zone, overwriting any previous holder and recording the
    /// claimant as a discoverer.
    pub fn claim_zone(&mut self, zone_id: &str, player_id: &str) -> Result<(), WorldError> {
        let mut zone = self.zone(zone_id)?.unwrap_or_default();
        zone.discovered_by.insert(player_id.to_owned());
        zone.claimed_by = Some(player_id.to_owned());
        let value = serde_json::to_value(&zone)?;
        self.put_map_entry(ZONES, zone_id, &value)
    }

    pub fn zone(&mut self, zone_id: &str) -> Result<Option<ZoneEntry>, WorldError> {
        match self.map_entry_raw(ZONES, zone_id)? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    pub fn zones(&mut self) -> Result<BTreeMap<String, ZoneEntry>, WorldError> {
        let mut out = BTreeMap::new();
        for (key, raw) in self.map_entries_raw(ZONES)? {
            if let Ok(zone) = serde_json::from_str(&raw) {
                out.insert(key, zone);
            }
        }
        Ok(out)
    }

    // -- trade board -----------------------------------------------------------

    /// Append an offer to the shared board, keeping the newest
    /// [`TRADE_BOARD_LIMIT`].
    pub fn add_trade_offer(&mut self, entry: &TradeOfferEntry) -> Result<(), WorldError> {
        let value = serde_json::to_value(entry)?;
        self.push_list_entry(TRADE_OFFERS, &value, TRADE_BOARD_LIMIT)
    }

    /// Remove the offer with this id, if present.
    pub fn remove_trade_offer(&mut self, offer_id: &str) -> Result<bool, WorldError> {
        let id = self.list_id(TRADE_OFFERS)?;
        let len = self.doc.length(&id);
        for i in 0..len {
            if let Some((value, _)) = self.doc.get(&id, i)? {
                if let Some(raw) = value.to_str() {
                    if let Ok(entry) = serde_json::from_str::<TradeOfferEntry>(raw) {
                        if entry.id == offer_id {
                            self.doc.delete(&id, i)?;
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    pub fn trade_offers(&mut self) -> Result<Vec<TradeOfferEntry>, WorldError> {
        Ok(self
            .list_entries_raw(TRADE_OFFERS)?
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect())
    }

    pub fn trade_offers_raw(&mut self) -> Result<Vec<String>, WorldError> {
        self.list_entries_raw(TRADE_OFFERS)
    }

    // -- combat feed -------------------------------------------------------------

    /// Append to the rolling combat feed, keeping the newest
    /// [`COMBAT_FEED_LIMIT`].
    pub fn add_combat_log(&mut self, entry: &CombatLogEntry) -> Result<(), WorldError> {
        let value = serde_json::to_value(entry)?;
        self.push_list_entry(COMBAT_LOGS, &value, COMBAT_FEED_LIMIT)
    }

    pub fn combat_logs(&mut self) -> Result<Vec<CombatLogEntry>, WorldError> {
        Ok(self
            .list_entries_raw(COMBAT_LOGS)?
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect())
    }

    // -- alliances ----------------------------------------------------------------

    pub fn upsert_alliance(&mut self, entry: &AllianceEntry) -> Result<(), WorldError> {
        let value = serde_json::to_value(entry)?;
        let id = entry.id.clone();
        self.put_map_entry(ALLIANCES, &id, &value)
    }

    pub fn remove_alliance(&mut self, alliance_id: &str) -> Result<bool, WorldError> {
        let id = self.map_id(ALLIANCES)?;
        if self.doc.get(&id, alliance_id)?.is_some() {
            self.doc.delete(&id, alliance_id)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn alliances(&mut self) -> Result<BTreeMap<String, AllianceEntry>, WorldError> {
        let mut out = BTreeMap::new();
        for (key, raw) in self.map_entries_raw(ALLIANCES)? {
            if let Ok(entry) = serde_json::from_str(&raw) {
                out.insert(key, entry);
            }
        }
        Ok(out)
    }

    pub fn alliances_raw(&mut self) -> Result<Vec<(String, String)>, WorldError> {
        self.map_entries_raw(ALLIANCES)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nodecoin_engine::state::Strategy;

    fn ranking(name: &str) -> RankingEntry {
        RankingEntry {
            name: name.into(),
            era: 1,
            prestige: 0,
            tokens: 100.0,
            total_army: 0,
            total_resources: 275,
            army_units: BTreeMap::new(),
            strategy: Strategy::Balanced,
            defense_bonus: 0.0,
            alliance_id: None,
            alliance_name: None,
            signature: String::new(),
            signed_by: String::new(),
        }
    }

    fn offer(id: &str, created_at: u64) -> TradeOfferEntry {
        TradeOfferEntry {
            id: id.into(),
            from: "p1".into(),
            offer: BTreeMap::new(),
            want: BTreeMap::new(),
            created_at,
            signature: String::new(),
            signed_by: String::new(),
        }
    }

    // -- 1. Rankings -----------------------------------------------------------

    #[test]
    fn ranking_upsert_and_read() {
        let mut doc = WorldDoc::new().unwrap();
        doc.update_ranking("p1", &ranking("Alice")).unwrap();
        doc.update_ranking("p2", &ranking("Bob")).unwrap();
        // Overwrite is last-writer-wins per key.
        let mut newer = ranking("Alice");
        newer.tokens = 500.0;
        doc.update_ranking("p1", &newer).unwrap();

        let all = doc.rankings().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["p1"].tokens, 500.0);
        assert_eq!(all["p2"].name, "Bob");
    }

    // -- 2. Zones ----------------------------------------------------------------

    #[test]
    fn zone_discovery_is_a_union() {
        let mut doc = WorldDoc::new().unwrap();
        doc.add_zone_discovery("tundra", "p1").unwrap();
        doc.add_zone_discovery("tundra", "p2").unwrap();
        doc.add_zone_discovery("tundra", "p1").unwrap();

        let zone = doc.zone("tundra").unwrap().unwrap();
        assert_eq!(zone.discovered_by.len(), 2);
        assert!(zone.claimed_by.is_none());
    }

    #[test]
    fn claim_overwrites_and_adds_discoverer() {
        let mut doc = WorldDoc::new().unwrap();
        doc.add_zone_discovery("cienaga", "p1").unwrap();
        doc.claim_zone("cienaga", "p2").unwrap();

        let zone = doc.zone("cienaga").unwrap().unwrap();
        assert_eq!(zone.claimed_by.as_deref(), Some("p2"));
        assert!(zone.discovered_by.contains("p1"));
        assert!(zone.discovered_by.contains("p2"));
    }

    // -- 3. Bounded lists ----------------------------------------------------------

    #[test]
    fn trade_board_keeps_last_fifty() {
        let mut doc = WorldDoc::new().unwrap();
        for i in 0..(TRADE_BOARD_LIMIT + 10) {
            doc.add_trade_offer(&offer(&format!("o{i}"), i as u64)).unwrap();
        }
        let offers = doc.trade_offers().unwrap();
        assert_eq!(offers.len(), TRADE_BOARD_LIMIT);
        assert_eq!(offers[0].id, "o10");
    }

    #[test]
    fn remove_trade_offer_by_id() {
        let mut doc = WorldDoc::new().unwrap();
        doc.add_trade_offer(&offer("keep", 1)).unwrap();
        doc.add_trade_offer(&offer("drop", 2)).unwrap();
        assert!(doc.remove_trade_offer("drop").unwrap());
        assert!(!doc.remove_trade_offer("drop").unwrap());
        let offers = doc.trade_offers().unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].id, "keep");
    }

    #[test]
    fn combat_feed_keeps_last_hundred() {
        let mut doc = WorldDoc::new().unwrap();
        for i in 0..(COMBAT_FEED_LIMIT + 5) {
            doc.add_combat_log(&CombatLogEntry {
                attacker: "a".into(),
                defender: "d".into(),
                winner: "a".into(),
                tick: i as u64,
            })
            .unwrap();
        }
        let logs = doc.combat_logs().unwrap();
        assert_eq!(logs.len(), COMBAT_FEED_LIMIT);
        assert_eq!(logs[0].tick, 5);
    }

    // -- 4. Alliances ------------------------------------------------------------------

    #[test]
    fn alliance_upsert_and_remove() {
        let mut doc = WorldDoc::new().unwrap();
        doc.upsert_alliance(&AllianceEntry {
            id: "a1".into(),
            name: "Norte".into(),
            leader_id: "p1".into(),
            members: vec!["p1".into()],
            signature: String::new(),
            signed_by: String::new(),
        })
        .unwrap();
        assert_eq!(doc.alliances().unwrap().len(), 1);
        assert!(doc.remove_alliance("a1").unwrap());
        assert!(!doc.remove_alliance("a1").unwrap());
        assert!(doc.alliances().unwrap().is_empty());
    }

    // -- 5. Persistence and history ------------------------------------------------------

    #[test]
    fn save_load_round_trip() {
        let mut doc = WorldDoc::new().unwrap();
        doc.update_ranking("p1", &ranking("Alice")).unwrap();
        doc.add_zone_discovery("tundra", "p1").unwrap();

        let bytes = doc.save();
        let mut loaded = WorldDoc::load(&bytes).unwrap();
        assert_eq!(loaded.rankings().unwrap().len(), 1);
        assert!(loaded.zone("tundra").unwrap().is_some());
    }

    #[test]
    fn incremental_changes_flow_between_forks() {
        let mut origin = WorldDoc::new().unwrap();
        let mut replica = origin.fork();
        let baseline = replica.heads();

        origin.update_ranking("p1", &ranking("Alice")).unwrap();
        origin.add_zone_discovery("tundra", "p1").unwrap();

        let blobs = origin.changes_since(&baseline);
        assert!(!blobs.is_empty());
        let applied = replica.apply_encoded_changes(&blobs).unwrap();
        assert_eq!(applied, blobs.len());
        assert_eq!(replica.rankings().unwrap().len(), 1);
        assert!(replica.zone("tundra").unwrap().is_some());
    }

    #[test]
    fn merge_of_forks_unions_keys() {
        let mut a = WorldDoc::new().unwrap();
        let mut b = a.fork();
        a.update_ranking("p1", &ranking("Alice")).unwrap();
        b.update_ranking("p2", &ranking("Bob")).unwrap();

        a.merge(&mut b).unwrap();
        let all = a.rankings().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn malformed_change_blob_is_an_error() {
        let mut doc = WorldDoc::new().unwrap();
        let err = doc.apply_encoded_changes(&[vec![1, 2, 3]]);
        assert!(err.is_err());
    }
}
