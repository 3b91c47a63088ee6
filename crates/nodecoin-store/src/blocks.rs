//! Chain block persistence.
//!
//! Blocks are keyed by hash with an insert-or-ignore discipline, which makes
//! re-delivery from gossip idempotent. The command payload is stored exploded
//! (`command_type`, `command_args`, `command_tick`) so the table can be
//! queried without JSON parsing; rows rebuild into [`Block`] losslessly.
//!
//! `save_command_result` is the transactional write the controller depends
//! on: snapshot and block commit together or not at all.

use rusqlite::{params, OptionalExtension, Row};

use nodecoin_chain::block::Block;

use crate::{Store, StoreError};

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, i64, String, String, i64, String, i64, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn assemble_block(
    (hash, prev_hash, block_index, player_id, command_type, command_tick, state_hash, timestamp, signature, public_key): (String, String, i64, String, String, i64, String, i64, String, String),
    command_args: String,
) -> Result<Block, StoreError> {
    let args: serde_json::Value = serde_json::from_str(&command_args)?;
    let command = serde_json::from_value(serde_json::json!({
        "type": command_type,
        "args": args,
        "tick": command_tick,
    }))?;
    Ok(Block {
        prev_hash,
        index: block_index as u64,
        player_id,
        command,
        state_hash,
        timestamp: timestamp as u64,
        public_key,
        hash,
        signature,
    })
}

const BLOCK_COLUMNS: &str = "hash, prev_hash, block_index, player_id, command_type, \
                             command_tick, state_hash, timestamp, signature, public_key";

impl Store {
    /// Insert a block; silently ignores a hash we already have.
    ///
    /// Returns `true` if the row was actually inserted.
    pub fn save_block(&self, block: &Block) -> Result<bool, StoreError> {
        let command_value = serde_json::to_value(&block.command)?;
        let args = command_value
            .get("args")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO chain_blocks
             (hash, prev_hash, block_index, player_id, command_type, command_args,
              command_tick, state_hash, timestamp, signature, public_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                block.hash,
                block.prev_hash,
                block.index as i64,
                block.player_id,
                block.command.kind.type_name(),
                serde_json::to_string(&args)?,
                block.command.tick as i64,
                block.state_hash,
                block.timestamp as i64,
                block.signature,
                block.public_key,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Atomically persist a command's snapshot and chain block.
    pub fn save_command_result(
        &mut self,
        player_id: &str,
        tick: u64,
        state_json: &str,
        state_hash: &str,
        block: &Block,
    ) -> Result<(), StoreError> {
        let command_value = serde_json::to_value(&block.command)?;
        let args = command_value
            .get("args")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let args_json = serde_json::to_string(&args)?;

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO state_snapshots (player_id, tick, state_json, state_hash)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (player_id, tick)
             DO UPDATE SET state_json = excluded.state_json,
                           state_hash = excluded.state_hash",
            params![player_id, tick as i64, state_json, state_hash],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO chain_blocks
             (hash, prev_hash, block_index, player_id, command_type, command_args,
              command_tick, state_hash, timestamp, signature, public_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                block.hash,
                block.prev_hash,
                block.index as i64,
                block.player_id,
                block.command.kind.type_name(),
                args_json,
                block.command.tick as i64,
                block.state_hash,
                block.timestamp as i64,
                block.signature,
                block.public_key,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Every block of a player's chain, ordered by index.
    pub fn load_chain(&self, player_id: &str) -> Result<Vec<Block>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {BLOCK_COLUMNS}, command_args FROM chain_blocks
             WHERE player_id = ?1 ORDER BY block_index ASC"
        ))?;
        let rows = stmt.query_map(params![player_id], |row| {
            let fixed = block_from_row(row)?;
            let args: String = row.get(10)?;
            Ok((fixed, args))
        })?;
        let mut blocks = Vec::new();
        for row in rows {
            let (fixed, args) = row?;
            blocks.push(assemble_block(fixed, args)?);
        }
        Ok(blocks)
    }

    /// Blocks of a player with `from_index <= index < to_index`.
    pub fn load_block_range(
        &self,
        player_id: &str,
        from_index: u64,
        to_index: u64,
    ) -> Result<Vec<Block>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {BLOCK_COLUMNS}, command_args FROM chain_blocks
             WHERE player_id = ?1 AND block_index >= ?2 AND block_index < ?3
             ORDER BY block_index ASC"
        ))?;
        let rows = stmt.query_map(
            params![player_id, from_index as i64, to_index as i64],
            |row| {
                let fixed = block_from_row(row)?;
                let args: String = row.get(10)?;
                Ok((fixed, args))
            },
        )?;
        let mut blocks = Vec::new();
        for row in rows {
            let (fixed, args) = row?;
            blocks.push(assemble_block(fixed, args)?);
        }
        Ok(blocks)
    }

    /// The highest-index block of a player, if any.
    pub fn latest_block(&self, player_id: &str) -> Result<Option<Block>, StoreError> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {BLOCK_COLUMNS}, command_args FROM chain_blocks
                     WHERE player_id = ?1 ORDER BY block_index DESC LIMIT 1"
                ),
                params![player_id],
                |row| {
                    let fixed = block_from_row(row)?;
                    let args: String = row.get(10)?;
                    Ok((fixed, args))
                },
            )
            .optional()?;
        match row {
            Some((fixed, args)) => Ok(Some(assemble_block(fixed, args)?)),
            None => Ok(None),
        }
    }

    /// Number of stored blocks for a player.
    pub fn chain_length(&self, player_id: &str) -> Result<u64, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chain_blocks WHERE player_id = ?1",
            params![player_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Whether a block with this hash is already stored.
    pub fn has_block(&self, hash: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chain_blocks WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every distinct player id with stored blocks.
    pub fn known_chain_players(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT DISTINCT player_id FROM chain_blocks ORDER BY player_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut players = Vec::new();
        for row in rows {
            players.push(row?);
        }
        Ok(players)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
