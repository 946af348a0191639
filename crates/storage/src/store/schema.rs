#![forbid(unsafe_code)]

use super::{StoreError, now_ms};
use rusqlite::{Connection, OptionalExtension, params};

pub const SUPPORTED_DB_VERSION: i64 = 1;

const SQL: &str = r#"
        CREATE TABLE IF NOT EXISTS kv (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS jobs (
          id INTEGER PRIMARY KEY,
          stream_id TEXT NOT NULL,
          profiles_json TEXT NOT NULL,
          broadcaster TEXT NOT NULL,
          max_price_per_segment INTEGER NOT NULL,
          creation_block INTEGER NOT NULL,
          end_block INTEGER NOT NULL,
          stop_reason TEXT,
          created_at_ms INTEGER NOT NULL,
          CHECK(creation_block <= end_block)
        );

        CREATE TABLE IF NOT EXISTS claims (
          job_id INTEGER NOT NULL,
          id INTEGER NOT NULL,
          range_start INTEGER NOT NULL,
          range_end INTEGER NOT NULL,
          merkle_root BLOB NOT NULL,
          status TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY(job_id, id),
          FOREIGN KEY(job_id) REFERENCES jobs(id),
          CHECK(range_start <= range_end)
        );

        CREATE TABLE IF NOT EXISTS receipts (
          job_id INTEGER NOT NULL,
          seq INTEGER NOT NULL,
          source_ref TEXT,
          data_hash BLOB NOT NULL,
          combined_hash BLOB NOT NULL,
          signature BLOB NOT NULL,
          window_start_ms INTEGER NOT NULL,
          window_end_ms INTEGER NOT NULL,
          claim_id INTEGER,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY(job_id, seq),
          FOREIGN KEY(job_id) REFERENCES jobs(id),
          FOREIGN KEY(job_id, claim_id) REFERENCES claims(job_id, id)
        );

        CREATE INDEX IF NOT EXISTS receipts_unclaimed
          ON receipts(job_id, seq) WHERE claim_id IS NULL;
        CREATE INDEX IF NOT EXISTS jobs_active
          ON jobs(end_block) WHERE stop_reason IS NULL;
"#;

pub(super) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SQL)?;

    let now_ms = now_ms();
    conn.execute(
        "INSERT OR IGNORE INTO kv(key, value, updated_at_ms) VALUES ('dbVersion', ?1, ?2)",
        params![SUPPORTED_DB_VERSION.to_string(), now_ms],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO kv(key, value, updated_at_ms) VALUES ('lastBlock', '0', ?1)",
        params![now_ms],
    )?;
    Ok(())
}

/// Refuses databases written by a newer schema.
pub(super) fn version_gate(conn: &Connection) -> Result<(), StoreError> {
    let raw = conn
        .query_row("SELECT value FROM kv WHERE key='dbVersion'", [], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    let Some(raw) = raw else {
        return Err(StoreError::InvalidInput("dbVersion is missing"));
    };
    let found = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidInput("dbVersion is not an integer"))?;
    if found > SUPPORTED_DB_VERSION {
        return Err(StoreError::DbTooNew {
            found,
            supported: SUPPORTED_DB_VERSION,
        });
    }
    Ok(())
}
