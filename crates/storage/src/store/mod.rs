#![forbid(unsafe_code)]

mod claims;
mod error;
mod jobs;
mod kv;
mod receipts;
mod requests;
mod schema;

pub use error::StoreError;
pub use requests::*;
pub use schema::SUPPORTED_DB_VERSION;

use rusqlite::{Connection, ErrorCode, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tc_core::{Hash32, JobId, SegmentReceipt, hash_from_slice};

const DB_FILE_NAME: &str = "tc_claims.db";

/// Durable store for jobs, receipts and claims.
///
/// Every mutation that matters for recovery runs inside one SQLite transaction,
/// so a crash leaves either the previous state or the complete new one.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::install_schema(&conn)?;
        schema::version_gate(&conn)?;

        Ok(Self { conn, storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(DB_FILE_NAME)
    }
}

const RECEIPT_COLUMNS: &str = "job_id, seq, source_ref, data_hash, combined_hash, signature, \
     window_start_ms, window_end_ms, claim_id";

fn receipt_from_row(row: &Row<'_>) -> Result<SegmentReceipt, StoreError> {
    Ok(SegmentReceipt {
        job_id: JobId::new(from_sqlite_u64(row.get::<_, i64>(0)?)?),
        seq: from_sqlite_u64(row.get::<_, i64>(1)?)?,
        source_ref: row.get::<_, Option<String>>(2)?,
        data_hash: hash_column(row.get::<_, Vec<u8>>(3)?)?,
        combined_hash: hash_column(row.get::<_, Vec<u8>>(4)?)?,
        signature: row.get::<_, Vec<u8>>(5)?,
        window_start_ms: row.get::<_, i64>(6)?,
        window_end_ms: row.get::<_, i64>(7)?,
        claim_id: row
            .get::<_, Option<i64>>(8)?
            .map(from_sqlite_u64)
            .transpose()?,
    })
}

fn hash_column(bytes: Vec<u8>) -> Result<Hash32, StoreError> {
    hash_from_slice(&bytes).ok_or(StoreError::InvalidInput("stored hash is not 32 bytes"))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn to_sqlite_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

fn from_sqlite_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::InvalidInput("negative value in unsigned column"))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
