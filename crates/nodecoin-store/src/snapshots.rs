//! State snapshot persistence.
//!
//! One row per `(player_id, tick)`, upserted: the controller snapshots after
//! every successful command and after every processed tick range, and loads
//! the newest row on startup.

use rusqlite::{params, OptionalExtension};

use crate::{Store, StoreError};

/// A persisted state snapshot row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub player_id: String,
    pub tick: u64,
    pub state_json: String,
    pub state_hash: String,
}

impl Store {
    /// Insert or replace the snapshot for `(player_id, tick)`.
    pub fn save_snapshot(
        &self,
        player_id: &str,
        tick: u64,
        state_json: &str,
        state_hash: &str,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO state_snapshots (player_id, tick, state_json, state_hash)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (player_id, tick)
             DO UPDATE SET state_json = excluded.state_json,
                           state_hash = excluded.state_hash",
            params![player_id, tick as i64, state_json, state_hash],
        )?;
        Ok(())
    }

    /// The snapshot with the highest tick for this player, if any.
    pub fn latest_snapshot(&self, player_id: &str) -> Result<Option<SnapshotRow>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT player_id, tick, state_json, state_hash
                 FROM state_snapshots
                 WHERE player_id = ?1
                 ORDER BY tick DESC
                 LIMIT 1",
                params![player_id],
                |row| {
                    Ok(SnapshotRow {
                        player_id: row.get(0)?,
                        tick: row.get::<_, i64>(1)? as u64,
                        state_json: row.get(2)?,
                        state_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// The snapshot at an exact tick, if present.
    pub fn snapshot_at(&self, player_id: &str, tick: u64) -> Result<Option<SnapshotRow>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT player_id, tick, state_json, state_hash
                 FROM state_snapshots
                 WHERE player_id = ?1 AND tick = ?2",
                params![player_id, tick as i64],
                |row| {
                    Ok(SnapshotRow {
                        player_id: row.get(0)?,
                        tick: row.get::<_, i64>(1)? as u64,
                        state_json: row.get(2)?,
                        state_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Drop snapshots older than `keep_newest` rows for a player. Keeps the
    /// table from growing without bound on long-lived nodes.
    pub fn prune_snapshots(&self, player_id: &str, keep_newest: u64) -> Result<usize, StoreError> {
        let deleted = self.conn().execute(
            "DELETE FROM state_snapshots
             WHERE player_id = ?1 AND tick NOT IN (
                 SELECT tick FROM state_snapshots
                 WHERE player_id = ?1
                 ORDER BY tick DESC
                 LIMIT ?2
             )",
            params![player_id, keep_newest as i64],
        )?;
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn save_and_load_latest() {
        let store = Store::open_in_memory().unwrap();
        store.save_snapshot("p1", 1, r#"{"a":1}"#, "h1").unwrap();
        store.save_snapshot("p1", 5, r#"{"a":5}"#, "h5").unwrap();
        store.save_snapshot("p1", 3, r#"{"a":3}"#, "h3").unwrap();

        let latest = store.latest_snapshot("p1").unwrap().unwrap();
        assert_eq!(latest.tick, 5);
        assert_eq!(latest.state_hash, "h5");
    }

    #[test]
    fn upsert_replaces_same_tick() {
        let store = Store::open_in_memory().unwrap();
        store.save_snapshot("p1", 2, r#"{"v":1}"#, "old").unwrap();
        store.save_snapshot("p1", 2, r#"{"v":2}"#, "new").unwrap();

        let row = store.snapshot_at("p1", 2).unwrap().unwrap();
        assert_eq!(row.state_hash, "new");
        assert!(store.latest_snapshot("p2").unwrap().is_none());
    }

    #[test]
    fn prune_keeps_newest() {
        let store = Store::open_in_memory().unwrap();
        for tick in 0..10 {
            store
                .save_snapshot("p1", tick, "{}", &format!("h{tick}"))
                .unwrap();
        }
        let deleted = store.prune_snapshots("p1", 3).unwrap();
        assert_eq!(deleted, 7);
        assert_eq!(store.latest_snapshot("p1").unwrap().unwrap().tick, 9);
        assert!(store.snapshot_at("p1", 2).unwrap().is_none());
    }
}
