//! Known-peer persistence.
//!
//! A reconnection hint set, keyed by multiaddr. Rows are upserted on every
//! successful dial and pruned by age at startup (default seven days).

use rusqlite::{params, OptionalExtension};

use crate::{Store, StoreError};

/// Peers older than this are pruned at startup (milliseconds).
pub const PEER_MAX_AGE_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// A persisted peer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPeer {
    pub multiaddr: String,
    pub peer_id: String,
    pub player_name: Option<String>,
    pub last_seen: u64,
    pub success_count: u64,
}

impl Store {
    /// Insert or refresh a peer row, bumping `last_seen`.
    pub fn upsert_peer(
        &self,
        multiaddr: &str,
        peer_id: &str,
        player_name: Option<&str>,
        last_seen: u64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO known_peers (multiaddr, peer_id, player_name, last_seen, success_count)
             VALUES (?1, ?2, ?3, ?4, 0)
             ON CONFLICT (multiaddr)
             DO UPDATE SET peer_id     = excluded.peer_id,
                           player_name = COALESCE(excluded.player_name, known_peers.player_name),
                           last_seen   = excluded.last_seen",
            params![multiaddr, peer_id, player_name, last_seen as i64],
        )?;
        Ok(())
    }

    /// Record a successful reconnection through this multiaddr.
    pub fn record_peer_success(&self, multiaddr: &str, now: u64) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE known_peers
             SET success_count = success_count + 1, last_seen = ?2
             WHERE multiaddr = ?1",
            params![multiaddr, now as i64],
        )?;
        Ok(())
    }

    /// Best reconnection candidates: recent first, ties broken by success.
    pub fn load_peers(&self, limit: u64) -> Result<Vec<KnownPeer>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT multiaddr, peer_id, player_name, last_seen, success_count
             FROM known_peers
             ORDER BY last_seen DESC, success_count DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(KnownPeer {
                multiaddr: row.get(0)?,
                peer_id: row.get(1)?,
                player_name: row.get(2)?,
                last_seen: row.get::<_, i64>(3)? as u64,
                success_count: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut peers = Vec::new();
        for row in rows {
            peers.push(row?);
        }
        Ok(peers)
    }

    /// Look up one peer by multiaddr.
    pub fn peer(&self, multiaddr: &str) -> Result<Option<KnownPeer>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT multiaddr, peer_id, player_name, last_seen, success_count
                 FROM known_peers WHERE multiaddr = ?1",
                params![multiaddr],
                |row| {
                    Ok(KnownPeer {
                        multiaddr: row.get(0)?,
                        peer_id: row.get(1)?,
                        player_name: row.get(2)?,
                        last_seen: row.get::<_, i64>(3)? as u64,
                        success_count: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Delete peers not seen within `max_age_ms` of `now`. Returns the number
    /// of rows removed.
    pub fn prune_peers(&self, now: u64, max_age_ms: u64) -> Result<usize, StoreError> {
        let cutoff = now.saturating_sub(max_age_ms);
        let deleted = self.conn().execute(
            "DELETE FROM known_peers WHERE last_seen < ?1",
            params![cutoff as i64],
        )?;
        if deleted > 0 {
            tracing::debug!(deleted, "pruned stale known peers");
        }
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
