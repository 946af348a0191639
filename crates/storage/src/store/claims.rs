#![forbid(unsafe_code)]

use super::*;
use rusqlite::params;
use tc_core::{ClaimId, ClaimRecord, SeqRange};

const MAX_CLAIM_STATUS_LEN: usize = 64;

const CLAIM_COLUMNS: &str =
    "job_id, id, range_start, range_end, merkle_root, status, created_at_ms";

impl SqliteStore {
    /// Inserts the next claim of a job and attaches every receipt of its range
    /// to it, in one transaction.
    ///
    /// Fails without writing anything when any sequence number of the range has
    /// no receipt or already belongs to a claim.
    pub fn insert_claim(&mut self, request: InsertClaimRequest) -> Result<ClaimRecord, StoreError> {
        let status = normalize_claim_status(&request.status)?;
        let job_id = request.job_id;
        let job_key = to_sqlite_i64(job_id.as_u64())?;
        let start = to_sqlite_i64(request.range.start)?;
        let end = to_sqlite_i64(request.range.end)?;
        let expected = request.range.segment_count();

        let tx = self.conn.transaction()?;
        jobs::ensure_job_exists_tx(&tx, job_id)?;

        let available = tx.query_row(
            "SELECT COUNT(1) FROM receipts \
             WHERE job_id=?1 AND seq BETWEEN ?2 AND ?3 AND claim_id IS NULL",
            params![job_key, start, end],
            |row| row.get::<_, i64>(0),
        )?;
        let available = from_sqlite_u64(available)?;
        if available != expected {
            return Err(StoreError::ClaimRangeUnavailable {
                job_id,
                start: request.range.start,
                end: request.range.end,
                expected,
                available,
            });
        }

        let claim_key = tx.query_row(
            "SELECT COALESCE(MAX(id) + 1, 0) FROM claims WHERE job_id=?1",
            params![job_key],
            |row| row.get::<_, i64>(0),
        )?;
        let created_at_ms = now_ms();
        tx.execute(
            "INSERT INTO claims(job_id, id, range_start, range_end, merkle_root, status, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job_key,
                claim_key,
                start,
                end,
                &request.merkle_root[..],
                status,
                created_at_ms,
            ],
        )?;
        tx.execute(
            "UPDATE receipts SET claim_id=?4 \
             WHERE job_id=?1 AND seq BETWEEN ?2 AND ?3 AND claim_id IS NULL",
            params![job_key, start, end, claim_key],
        )?;

        tx.commit()?;
        Ok(ClaimRecord {
            job_id,
            claim_id: from_sqlite_u64(claim_key)?,
            range: request.range,
            merkle_root: request.merkle_root,
            status,
            created_at_ms,
        })
    }

    pub fn set_claim_status(
        &mut self,
        job_id: JobId,
        claim_id: ClaimId,
        status: &str,
    ) -> Result<(), StoreError> {
        let status = normalize_claim_status(status)?;
        let updated = self.conn.execute(
            "UPDATE claims SET status=?3 WHERE job_id=?1 AND id=?2",
            params![
                to_sqlite_i64(job_id.as_u64())?,
                to_sqlite_i64(claim_id)?,
                status
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownClaim { job_id, claim_id });
        }
        Ok(())
    }

    pub fn get_claim(
        &self,
        job_id: JobId,
        claim_id: ClaimId,
    ) -> Result<Option<ClaimRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE job_id=?1 AND id=?2"
        ))?;
        let mut rows = stmt.query(params![
            to_sqlite_i64(job_id.as_u64())?,
            to_sqlite_i64(claim_id)?
        ])?;
        match rows.next()? {
            Some(row) => Ok(Some(claim_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_claims(&self, job_id: JobId) -> Result<Vec<ClaimRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims WHERE job_id=?1 ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![to_sqlite_i64(job_id.as_u64())?])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(claim_from_row(row)?);
        }
        Ok(out)
    }

    /// Number of claims recorded for a job; zero for unknown jobs.
    pub fn count_claims(&self, job_id: JobId) -> Result<u64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(1) FROM claims WHERE job_id=?1",
            params![to_sqlite_i64(job_id.as_u64())?],
            |row| row.get::<_, i64>(0),
        )?;
        from_sqlite_u64(count)
    }

    /// Receipts of `range` that exist and are not yet attached to a claim.
    pub fn unclaimed_in_range(&self, job_id: JobId, range: SeqRange) -> Result<u64, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(1) FROM receipts \
             WHERE job_id=?1 AND seq BETWEEN ?2 AND ?3 AND claim_id IS NULL",
            params![
                to_sqlite_i64(job_id.as_u64())?,
                to_sqlite_i64(range.start)?,
                to_sqlite_i64(range.end)?
            ],
            |row| row.get::<_, i64>(0),
        )?;
        from_sqlite_u64(count)
    }

    pub fn total_claims(&self) -> Result<u64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(1) FROM claims", [], |row| row.get::<_, i64>(0))?;
        from_sqlite_u64(count)
    }

    pub fn receipts_for_claim(
        &self,
        job_id: JobId,
        claim_id: ClaimId,
    ) -> Result<Vec<SegmentReceipt>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts \
             WHERE job_id=?1 AND claim_id=?2 \
             ORDER BY seq ASC"
        ))?;
        let mut rows = stmt.query(params![
            to_sqlite_i64(job_id.as_u64())?,
            to_sqlite_i64(claim_id)?
        ])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(receipt_from_row(row)?);
        }
        Ok(out)
    }
}

fn normalize_claim_status(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("claim.status must not be empty"));
    }
    if raw.len() > MAX_CLAIM_STATUS_LEN {
        return Err(StoreError::InvalidInput("claim.status is too long"));
    }
    Ok(raw.to_string())
}

fn claim_from_row(row: &Row<'_>) -> Result<ClaimRecord, StoreError> {
    let start = from_sqlite_u64(row.get::<_, i64>(2)?)?;
    let end = from_sqlite_u64(row.get::<_, i64>(3)?)?;
    Ok(ClaimRecord {
        job_id: JobId::new(from_sqlite_u64(row.get::<_, i64>(0)?)?),
        claim_id: from_sqlite_u64(row.get::<_, i64>(1)?)?,
        range: SeqRange::new(start, end)
            .ok_or(StoreError::InvalidInput("stored claim range is inverted"))?,
        merkle_root: hash_column(row.get::<_, Vec<u8>>(4)?)?,
        status: row.get::<_, String>(5)?,
        created_at_ms: row.get::<_, i64>(6)?,
    })
}
