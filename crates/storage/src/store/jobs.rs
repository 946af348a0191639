#![forbid(unsafe_code)]

use super::*;
use rusqlite::{OptionalExtension, Transaction, params};
use tc_core::{Job, JobError, Profile};

const MAX_STOP_REASON_LEN: usize = 400;

const JOB_COLUMNS: &str = "id, stream_id, profiles_json, broadcaster, max_price_per_segment, \
     creation_block, end_block, stop_reason";

impl SqliteStore {
    pub fn insert_job(&mut self, job: &Job) -> Result<(), StoreError> {
        let profiles_json = serde_json::to_string(job.profiles())
            .map_err(|_| StoreError::InvalidInput("profiles are not serializable"))?;

        let tx = self.conn.transaction()?;
        let insert = tx.execute(
            "INSERT INTO jobs(id, stream_id, profiles_json, broadcaster, max_price_per_segment, \
             creation_block, end_block, stop_reason, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                to_sqlite_i64(job.id().as_u64())?,
                job.stream_id(),
                profiles_json,
                job.broadcaster(),
                to_sqlite_i64(job.max_price_per_segment())?,
                to_sqlite_i64(job.creation_block())?,
                to_sqlite_i64(job.end_block())?,
                job.stop_reason(),
                now_ms(),
            ],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::JobAlreadyExists(job.id()));
            }
            return Err(StoreError::Sql(err));
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id=?1"))?;
        let mut rows = stmt.query(params![to_sqlite_i64(job_id.as_u64())?])?;
        match rows.next()? {
            Some(row) => Ok(Some(job_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Jobs that end after `min_end_block` and have not been stopped.
    pub fn active_jobs(&self, min_end_block: u64) -> Result<Vec<Job>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE end_block > ?1 AND stop_reason IS NULL \
             ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![to_sqlite_i64(min_end_block)?])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(job_from_row(row)?);
        }
        Ok(out)
    }

    pub fn set_stop_reason(&mut self, job_id: JobId, reason: &str) -> Result<(), StoreError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(StoreError::InvalidInput("stop reason must not be empty"));
        }
        let reason: String = reason.chars().take(MAX_STOP_REASON_LEN).collect();

        let updated = self.conn.execute(
            "UPDATE jobs SET stop_reason=?2 WHERE id=?1",
            params![to_sqlite_i64(job_id.as_u64())?, reason],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownJob(job_id));
        }
        Ok(())
    }
}

pub(super) fn ensure_job_exists_tx(tx: &Transaction<'_>, job_id: JobId) -> Result<(), StoreError> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM jobs WHERE id=?1",
            params![to_sqlite_i64(job_id.as_u64())?],
            |_| Ok(()),
        )
        .optional()?;
    match exists {
        Some(()) => Ok(()),
        None => Err(StoreError::UnknownJob(job_id)),
    }
}

fn job_from_row(row: &Row<'_>) -> Result<Job, StoreError> {
    let job_id = JobId::new(from_sqlite_u64(row.get::<_, i64>(0)?)?);
    let profiles: Vec<Profile> = serde_json::from_str(&row.get::<_, String>(2)?)
        .map_err(|_| StoreError::InvalidProfile(job_id))?;

    let job = Job::try_new(
        job_id,
        row.get::<_, String>(1)?,
        profiles,
        row.get::<_, String>(3)?,
        from_sqlite_u64(row.get::<_, i64>(4)?)?,
        from_sqlite_u64(row.get::<_, i64>(5)?)?,
        from_sqlite_u64(row.get::<_, i64>(6)?)?,
    )
    .map_err(|err| match err {
        JobError::Profiles(_) => StoreError::InvalidProfile(job_id),
        _ => StoreError::InvalidInput("invalid job row"),
    })?;

    Ok(job.with_stop_reason(row.get::<_, Option<String>>(7)?))
}
