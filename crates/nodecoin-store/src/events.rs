//! Event journal.
//!
//! An append-only journal of opaque payloads (battle reports, trade
//! settlements, sync milestones). The store does not interpret the payload;
//! owning components pick their own `kind` strings.

use rusqlite::params;

use crate::{Store, StoreError};

/// A journal row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub id: u64,
    pub player_id: String,
    pub tick: u64,
    pub kind: String,
    pub payload: String,
    pub timestamp: u64,
}

impl Store {
    /// Append one event.
    pub fn append_event(
        &self,
        player_id: &str,
        tick: u64,
        kind: &str,
        payload: &str,
        timestamp: u64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO events (player_id, tick, kind, payload, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![player_id, tick as i64, kind, payload, timestamp as i64],
        )?;
        Ok(())
    }

    /// The newest `limit` events for a player, newest first.
    pub fn recent_events(&self, player_id: &str, limit: u64) -> Result<Vec<EventRow>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT id, player_id, tick, kind, payload, timestamp
             FROM events WHERE player_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![player_id, limit as i64], |row| {
            Ok(EventRow {
                id: row.get::<_, i64>(0)? as u64,
                player_id: row.get(1)?,
                tick: row.get::<_, i64>(2)? as u64,
                kind: row.get(3)?,
                payload: row.get(4)?,
                timestamp: row.get::<_, i64>(5)? as u64,
            })
        })?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn append_and_read_back_newest_first() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5u64 {
            store
                .append_event("p1", i, "combat", &format!("{{\"n\":{i}}}"), 1_000 + i)
                .unwrap();
        }
        let events = store.recent_events("p1", 3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].tick, 4);
        assert_eq!(events[2].tick, 2);
        assert!(store.recent_events("p2", 3).unwrap().is_empty());
    }
}
