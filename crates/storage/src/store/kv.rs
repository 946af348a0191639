#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, params};

impl SqliteStore {
    /// Highest block the process has observed; 0 on a fresh store.
    pub fn last_seen_block(&self) -> Result<u64, StoreError> {
        let raw = self
            .conn
            .query_row("SELECT value FROM kv WHERE key='lastBlock'", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        let Some(raw) = raw else {
            return Ok(0);
        };
        raw.trim()
            .parse::<u64>()
            .map_err(|_| StoreError::InvalidInput("lastBlock is not an unsigned integer"))
    }

    pub fn set_last_seen_block(&mut self, block: u64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv(key, value, updated_at_ms) VALUES ('lastBlock', ?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms",
            params![block.to_string(), now_ms()],
        )?;
        Ok(())
    }

    pub fn db_version(&self) -> Result<i64, StoreError> {
        let raw = self
            .conn
            .query_row("SELECT value FROM kv WHERE key='dbVersion'", [], |row| {
                row.get::<_, String>(0)
            })?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| StoreError::InvalidInput("dbVersion is not an integer"))
    }
}
