//! Signing and verification of shared-world items, and the signed rebuild
//! used to ingest full documents from other peers.
//!
//! A signed item carries `signature` (Ed25519 over the SHA-256 of the
//! canonical encoding of the item with the two signing fields removed) and
//! `signedBy` (the signer's public key, lowercase hex).
//!
//! Two independent peers share no automerge ancestry, so a raw CRDT merge of
//! their documents is unsound. [`rebuild_from_remote`] implements the safe
//! path: verify every signed item from the remote, fold the survivors into a
//! fresh document, then replay the local document's own verified items on
//! top so nothing written here is lost.

use serde_json::Value;

use nodecoin_chain::canonical::hash_value;
use nodecoin_chain::keys::{verify_signature_hex, PlayerKeypair};

use crate::doc::WorldDoc;
use crate::entries::{AllianceEntry, CombatLogEntry, RankingEntry, TradeOfferEntry, ZoneEntry};
use crate::WorldError;

// ---------------------------------------------------------------------------
// Value-level signing
// ---------------------------------------------------------------------------

/// Hash of a signed item's payload: the canonical encoding with `signature`
/// and `signedBy` removed.
fn payload_hash(value: &Value) -> String {
    let mut stripped = value.clone();
    if let Value::Object(map) = &mut stripped {
        map.remove("signature");
        map.remove("signedBy");
    }
    hash_value(&stripped)
}

/// Sign a JSON object in place, attaching `signature` and `signedBy`.
pub fn sign_value(value: &mut Value, keypair: &PlayerKeypair) -> Result<(), WorldError> {
    let hash = payload_hash(value);
    let hash_bytes =
        hex::decode(&hash).map_err(|e| WorldError::Signing(format!("hash hex: {e}")))?;
    let signature = keypair.sign_hex(&hash_bytes);
    let Value::Object(map) = value else {
        return Err(WorldError::Signing("signed items must be objects".into()));
    };
    map.insert("signature".to_owned(), Value::String(signature));
    map.insert(
        "signedBy".to_owned(),
        Value::String(keypair.public_key_hex()),
    );
    Ok(())
}

/// Verify a signed JSON object. Malformed input verifies as `false`.
pub fn verify_value(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    let Some(signature) = map.get("signature").and_then(Value::as_str) else {
        return false;
    };
    let Some(signed_by) = map.get("signedBy").and_then(Value::as_str) else {
        return false;
    };
    let Ok(hash_bytes) = hex::decode(payload_hash(value)) else {
        return false;
    };
    verify_signature_hex(signed_by, &hash_bytes, signature)
}

/// Sign a typed entry, returning it with `signature`/`signed_by` populated.
pub fn sign_entry<T>(entry: &T, keypair: &PlayerKeypair) -> Result<T, WorldError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(entry)?;
    sign_value(&mut value, keypair)?;
    Ok(serde_json::from_value(value)?)
}

/// Verify a raw payload string as stored in the document.
pub fn verify_raw(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw)
        .map(|v| verify_value(&v))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Full-document ingestion
// ---------------------------------------------------------------------------

/// Rebuild the shared document from a remote full payload.
///
/// Signed items (rankings, trade offers, alliances) from the remote are
/// verified and folded into a fresh document; failures are dropped. Unsigned
/// items (zones, combat logs) are taken if structurally valid. The local
/// document's own verified signed items and zone knowledge replay on top, so
/// local writes win any key conflict and survive the swap.
pub fn rebuild_from_remote(
    local: &mut WorldDoc,
    remote: &mut WorldDoc,
) -> Result<WorldDoc, WorldError> {
    let mut fresh = WorldDoc::new()?;

    // Rankings: remote first, local replayed on top.
    for source in [&mut *remote, &mut *local] {
        for (player_id, raw) in source.rankings_raw()? {
            if !verify_raw(&raw) {
                tracing::debug!(player = %player_id, "dropping unverified ranking");
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<RankingEntry>(&raw) {
                fresh.update_ranking(&player_id, &entry)?;
            }
        }
    }

    // Alliances: same discipline.
    for source in [&mut *remote, &mut *local] {
        for (alliance_id, raw) in source.alliances_raw()? {
            if !verify_raw(&raw) {
                tracing::debug!(alliance = %alliance_id, "dropping unverified alliance");
                continue;
            }
            if let Ok(entry) = serde_json::from_str::<AllianceEntry>(&raw) {
                fresh.upsert_alliance(&entry)?;
            }
        }
    }

    // Trade offers: verified, deduplicated by offer id, remote first.
    let mut seen_offers = std::collections::BTreeSet::new();
    for source in [&mut *remote, &mut *local] {
        for raw in source.trade_offers_raw()? {
            if !verify_raw(&raw) {
                tracing::debug!("dropping unverified trade offer");
                continue;
            }
            let Ok(entry) = serde_json::from_str::<TradeOfferEntry>(&raw) else {
                continue;
            };
            if seen_offers.insert(entry.id.clone()) {
                fresh.add_trade_offer(&entry)?;
            }
        }
    }

    // Zones: structural validation only; discovery sets union across sources.
    for source in [&mut *remote, &mut *local] {
        for (zone_id, zone) in source.zones()? {
            if !zone_is_plausible(&zone) {
                tracing::debug!(zone = %zone_id, "dropping implausible zone entry");
                continue;
            }
            for discoverer in &zone.discovered_by {
                fresh.add_zone_discovery(&zone_id, discoverer)?;
            }
            if let Some(holder) = &zone.claimed_by {
                fresh.claim_zone(&zone_id, holder)?;
            }
        }
    }

    // Combat feed: informational; concatenate and deduplicate.
    let mut seen_logs: Vec<CombatLogEntry> = Vec::new();
    for source in [&mut *remote, &mut *local] {
        for entry in source.combat_logs()? {
            if !seen_logs.contains(&entry) {
                seen_logs.push(entry);
            }
        }
    }
    for entry in &seen_logs {
        fresh.add_combat_log(entry)?;
    }

    Ok(fresh)
}

/// Validate a zone entry parsed from an untrusted payload.
///
/// Zones are unsigned; the only defense is shape. A claimant must also be a
/// discoverer.
pub fn zone_is_plausible(zone: &ZoneEntry) -> bool {
    match &zone.claimed_by {
        Some(holder) => zone.discovered_by.contains(holder),
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use nodecoin_engine::state::Strategy;
    use std::collections::BTreeMap;

    fn keypair(seed: &str) -> PlayerKeypair {
        PlayerKeypair::from_seed(seed)
    }

    fn ranking(name: &str, tokens: f64) -> RankingEntry {
        RankingEntry {
            name: name.into(),
            era: 1,
            prestige: 0,
            tokens,
            total_army: 0,
            total_resources: 0,
            army_units: BTreeMap::new(),
            strategy: Strategy::Balanced,
            defense_bonus: 0.0,
            alliance_id: None,
            alliance_name: None,
            signature: String::new(),
            signed_by: String::new(),
        }
    }

    // -- 1. Sign / verify -------------------------------------------------------

    #[test]
    fn sign_verify_round_trip() {
        let kp = keypair("world-signer");
        let signed = sign_entry(&ranking("Alice", 100.0), &kp).unwrap();
        assert_eq!(signed.signed_by, kp.public_key_hex());
        assert_eq!(signed.signature.len(), 128);

        let value = serde_json::to_value(&signed).unwrap();
        assert!(verify_value(&value));
    }

    #[test]
    fn tampering_breaks_verification() {
        let kp = keypair("world-signer");
        let signed = sign_entry(&ranking("Alice", 100.0), &kp).unwrap();
        let mut value = serde_json::to_value(&signed).unwrap();
        value["tokens"] = serde_json::json!(999999.0);
        assert!(!verify_value(&value));
    }

    #[test]
    fn unsigned_value_fails_verification() {
        let value = serde_json::to_value(ranking("Eve", 1.0)).unwrap();
        assert!(!verify_value(&value));
    }

    #[test]
    fn key_order_does_not_matter_for_verification() {
        let kp = keypair("world-signer");
        let signed = sign_entry(&ranking("Alice", 100.0), &kp).unwrap();
        // Round-trip through a string parse: serde_json's map ordering may
        // differ from the canonical order, verification must not care.
        let text = serde_json::to_string(&signed).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(verify_value(&value));
    }

    // -- 2. Rebuild from remote ---------------------------------------------------

    #[test]
    fn rebuild_keeps_verified_and_drops_forged() {
        let us = keypair("us");
        let them = keypair("them");

        let mut local = WorldDoc::new().unwrap();
        local
            .update_ranking("us", &sign_entry(&ranking("Us", 100.0), &us).unwrap())
            .unwrap();

        let mut remote = WorldDoc::new().unwrap();
        remote
            .update_ranking("them", &sign_entry(&ranking("Them", 50.0), &them).unwrap())
            .unwrap();
        // A forged entry: claims high tokens but carries a broken signature.
        let mut forged = sign_entry(&ranking("Forger", 9999.0), &them).unwrap();
        forged.tokens = 1_000_000.0;
        remote.update_ranking("forger", &forged).unwrap();

        let mut rebuilt = rebuild_from_remote(&mut local, &mut remote).unwrap();
        let rankings = rebuilt.rankings().unwrap();
        assert_eq!(rankings.len(), 2, "forged entry must be dropped");
        assert!(rankings.contains_key("us"));
        assert!(rankings.contains_key("them"));
    }

    #[test]
    fn rebuild_prefers_local_on_key_conflict() {
        let us = keypair("us");
        let mut local = WorldDoc::new().unwrap();
        local
            .update_ranking("us", &sign_entry(&ranking("Us", 700.0), &us).unwrap())
            .unwrap();

        // The remote carries a stale (but genuinely signed) copy of our entry.
        let mut remote = WorldDoc::new().unwrap();
        remote
            .update_ranking("us", &sign_entry(&ranking("Us", 1.0), &us).unwrap())
            .unwrap();

        let mut rebuilt = rebuild_from_remote(&mut local, &mut remote).unwrap();
        assert_eq!(rebuilt.rankings().unwrap()["us"].tokens, 700.0);
    }

    #[test]
    fn rebuild_unions_zone_knowledge() {
        let mut local = WorldDoc::new().unwrap();
        local.add_zone_discovery("tundra", "us").unwrap();
        let mut remote = WorldDoc::new().unwrap();
        remote.add_zone_discovery("tundra", "them").unwrap();
        remote.add_zone_discovery("cienaga", "them").unwrap();

        let mut rebuilt = rebuild_from_remote(&mut local, &mut remote).unwrap();
        let zones = rebuilt.zones().unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones["tundra"].discovered_by.len(), 2);
    }

    #[test]
    fn rebuild_deduplicates_trade_offers() {
        let us = keypair("us");
        let entry = sign_entry(
            &TradeOfferEntry {
                id: "offer-1".into(),
                from: "us".into(),
                offer: BTreeMap::new(),
                want: BTreeMap::new(),
                created_at: 5,
                signature: String::new(),
                signed_by: String::new(),
            },
            &us,
        )
        .unwrap();
        let mut local = WorldDoc::new().unwrap();
        local.add_trade_offer(&entry).unwrap();
        let mut remote = WorldDoc::new().unwrap();
        remote.add_trade_offer(&entry).unwrap();

        let mut rebuilt = rebuild_from_remote(&mut local, &mut remote).unwrap();
        assert_eq!(rebuilt.trade_offers().unwrap().len(), 1);
    }

    // -- 3. Zone plausibility -------------------------------------------------------

    #[test]
    fn claimant_must_be_discoverer() {
        let mut zone = ZoneEntry::default();
        zone.claimed_by = Some("ghost".into());
        assert!(!zone_is_plausible(&zone));
        zone.discovered_by.insert("ghost".into());
        assert!(zone_is_plausible(&zone));
    }
}
