//! In-memory peer registry.
//!
//! Populated by peer-connect events and refreshed by `announce` messages.
//! Durable reconnection hints live in the store's `known_peers` table; this
//! registry only tracks the live session.

use std::collections::HashMap;

use parking_lot::Mutex;

/// What we currently know about a connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub address: String,
    pub player_name: String,
    pub era: u8,
    pub connected_at: u64,
    pub last_seen: u64,
}

/// Live peers keyed by player id.
#[derive(Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<String, PeerInfo>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh connection. Returns `true` if the peer was new.
    pub fn mark_connected(&self, player_id: &str, address: &str, now: u64) -> bool {
        let mut peers = self.peers.lock();
        match peers.get_mut(player_id) {
            Some(info) => {
                info.address = address.to_owned();
                info.last_seen = now;
                false
            }
            None => {
                peers.insert(
                    player_id.to_owned(),
                    PeerInfo {
                        address: address.to_owned(),
                        player_name: String::new(),
                        era: 1,
                        connected_at: now,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Fold an announce into the registry. Returns `true` if this player was
    /// previously unknown (the caller then requests their chain from zero).
    pub fn on_announce(
        &self,
        player_id: &str,
        player_name: &str,
        era: u8,
        address: &str,
        now: u64,
    ) -> bool {
        let mut peers = self.peers.lock();
        match peers.get_mut(player_id) {
            Some(info) => {
                info.player_name = player_name.to_owned();
                info.era = era;
                info.address = address.to_owned();
                info.last_seen = now;
                false
            }
            None => {
                peers.insert(
                    player_id.to_owned(),
                    PeerInfo {
                        address: address.to_owned(),
                        player_name: player_name.to_owned(),
                        era,
                        connected_at: now,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    pub fn remove(&self, player_id: &str) -> Option<PeerInfo> {
        self.peers.lock().remove(player_id)
    }

    pub fn get(&self, player_id: &str) -> Option<PeerInfo> {
        self.peers.lock().get(player_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Snapshot of all live peers.
    pub fn list(&self) -> Vec<(String, PeerInfo)> {
        let mut out: Vec<(String, PeerInfo)> = self
            .peers
            .lock()
            .iter()
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_registers_then_refreshes() {
        let registry = PeerRegistry::new();
        assert!(registry.on_announce("p2", "Bob", 1, "/ip4/x", 100));
        assert!(!registry.on_announce("p2", "Bob", 2, "/ip4/y", 200));

        let info = registry.get("p2").unwrap();
        assert_eq!(info.era, 2);
        assert_eq!(info.address, "/ip4/y");
        assert_eq!(info.connected_at, 100);
        assert_eq!(info.last_seen, 200);
    }

    #[test]
    fn connect_before_announce_keeps_connected_at() {
        let registry = PeerRegistry::new();
        assert!(registry.mark_connected("p2", "/ip4/x", 50));
        assert!(!registry.on_announce("p2", "Bob", 1, "/ip4/x", 80));
        assert_eq!(registry.get("p2").unwrap().connected_at, 50);
        assert_eq!(registry.get("p2").unwrap().player_name, "Bob");
    }

    #[test]
    fn remove_and_list() {
        let registry = PeerRegistry::new();
        registry.on_announce("p3", "C", 1, "/c", 1);
        registry.on_announce("p2", "B", 1, "/b", 1);
        assert_eq!(registry.len(), 2);

        let listed: Vec<String> = registry.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(listed, vec!["p2", "p3"]);

        assert!(registry.remove("p2").is_some());
        assert!(registry.remove("p2").is_none());
        assert_eq!(registry.len(), 1);
    }
}
