#![forbid(unsafe_code)]

use super::*;
use rusqlite::params;
use std::collections::BTreeMap;
use tc_core::SeqNo;

const MAX_SOURCE_REF_LEN: usize = 1024;
const MAX_SIGNATURE_LEN: usize = 1024;

impl SqliteStore {
    /// Records one segment receipt. A second receipt for the same `(job, seq)`
    /// fails with [`StoreError::DuplicateReceipt`] and leaves the store untouched.
    pub fn insert_receipt(
        &mut self,
        request: InsertReceiptRequest,
    ) -> Result<SegmentReceipt, StoreError> {
        if request
            .source_ref
            .as_ref()
            .is_some_and(|value| value.len() > MAX_SOURCE_REF_LEN)
        {
            return Err(StoreError::InvalidInput("receipt.source_ref is too long"));
        }
        if request.signature.len() > MAX_SIGNATURE_LEN {
            return Err(StoreError::InvalidInput("receipt.signature is too long"));
        }
        if request.window_end_ms < request.window_start_ms {
            return Err(StoreError::InvalidInput(
                "receipt window must not end before it starts",
            ));
        }

        let tx = self.conn.transaction()?;
        jobs::ensure_job_exists_tx(&tx, request.job_id)?;

        let insert = tx.execute(
            "INSERT INTO receipts(job_id, seq, source_ref, data_hash, combined_hash, signature, \
             window_start_ms, window_end_ms, claim_id, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
            params![
                to_sqlite_i64(request.job_id.as_u64())?,
                to_sqlite_i64(request.seq)?,
                request.source_ref.as_deref(),
                &request.data_hash[..],
                &request.combined_hash[..],
                request.signature.as_slice(),
                request.window_start_ms,
                request.window_end_ms,
                now_ms(),
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::DuplicateReceipt {
                    job_id: request.job_id,
                    seq: request.seq,
                });
            }
            return Err(StoreError::Sql(err));
        }

        tx.commit()?;
        Ok(SegmentReceipt {
            job_id: request.job_id,
            seq: request.seq,
            source_ref: request.source_ref,
            data_hash: request.data_hash,
            combined_hash: request.combined_hash,
            signature: request.signature,
            window_start_ms: request.window_start_ms,
            window_end_ms: request.window_end_ms,
            claim_id: None,
        })
    }

    pub fn receipt_exists(&self, job_id: JobId, seq: SeqNo) -> Result<bool, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(1) FROM receipts WHERE job_id=?1 AND seq=?2",
            params![to_sqlite_i64(job_id.as_u64())?, to_sqlite_i64(seq)?],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_receipt(
        &self,
        job_id: JobId,
        seq: SeqNo,
    ) -> Result<Option<SegmentReceipt>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE job_id=?1 AND seq=?2"
        ))?;
        let mut rows = stmt.query(params![to_sqlite_i64(job_id.as_u64())?, to_sqlite_i64(seq)?])?;
        match rows.next()? {
            Some(row) => Ok(Some(receipt_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Every receipt not yet covered by a claim, grouped by job and ordered by
    /// sequence number.
    pub fn unclaimed_receipts(&self) -> Result<BTreeMap<JobId, Vec<SegmentReceipt>>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts \
             WHERE claim_id IS NULL \
             ORDER BY job_id ASC, seq ASC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut out: BTreeMap<JobId, Vec<SegmentReceipt>> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let receipt = receipt_from_row(row)?;
            out.entry(receipt.job_id).or_default().push(receipt);
        }
        Ok(out)
    }

    pub fn unclaimed_receipts_for_job(
        &self,
        job_id: JobId,
    ) -> Result<Vec<SegmentReceipt>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts \
             WHERE job_id=?1 AND claim_id IS NULL \
             ORDER BY seq ASC"
        ))?;
        let mut rows = stmt.query(params![to_sqlite_i64(job_id.as_u64())?])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(receipt_from_row(row)?);
        }
        Ok(out)
    }
}
