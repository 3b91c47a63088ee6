//! Nodecoin Store -- SQLite persistence for one node.
//!
//! Four durable collections back the core: state snapshots, chain blocks,
//! known peers, and an event journal. The contract that matters is
//! transactionality: everything a single command writes (its state snapshot
//! plus its chain block) commits in one SQLite transaction or not at all.
//!
//! The store is deliberately dumb -- no caching, no business rules. The
//! controller decides what to write and when.

#![deny(unsafe_code)]

use std::path::Path;

use rusqlite::Connection;

pub mod blocks;
pub mod events;
pub mod peers;
pub mod snapshots;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store operations. All are fatal to the surrounding
/// command per the node's error policy.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored row is malformed: {0}")]
    MalformedRow(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the node's SQLite database.
///
/// Not internally synchronized; the controller guards it with its own lock.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if missing) the database at `path` and run the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an ephemeral in-memory database. Used by tests and `--no-p2p`
    /// dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS state_snapshots (
                player_id   TEXT    NOT NULL,
                tick        INTEGER NOT NULL,
                state_json  TEXT    NOT NULL,
                state_hash  TEXT    NOT NULL,
                PRIMARY KEY (player_id, tick)
            );

            CREATE TABLE IF NOT EXISTS chain_blocks (
                hash          TEXT PRIMARY KEY,
                prev_hash     TEXT    NOT NULL,
                block_index   INTEGER NOT NULL,
                player_id     TEXT    NOT NULL,
                command_type  TEXT    NOT NULL,
                command_args  TEXT    NOT NULL,
                command_tick  INTEGER NOT NULL,
                state_hash    TEXT    NOT NULL,
                timestamp     INTEGER NOT NULL,
                signature     TEXT    NOT NULL,
                public_key    TEXT    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chain_blocks_player
                ON chain_blocks (player_id, block_index);

            CREATE TABLE IF NOT EXISTS known_peers (
                multiaddr     TEXT PRIMARY KEY,
                peer_id       TEXT    NOT NULL,
                player_name   TEXT,
                last_seen     INTEGER NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS events (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id TEXT    NOT NULL,
                tick      INTEGER NOT NULL,
                kind      TEXT    NOT NULL,
                payload   TEXT    NOT NULL,
                timestamp INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.db");
        {
            let store = Store::open(&path).unwrap();
            drop(store);
        }
        // Re-open: schema init is idempotent.
        let store = Store::open(&path).unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM chain_blocks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn in_memory_store_works() {
        let store = Store::open_in_memory().unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM known_peers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
