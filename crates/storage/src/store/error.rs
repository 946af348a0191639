#![forbid(unsafe_code)]

use tc_core::{ClaimId, JobId, SeqNo};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("database version {found} is newer than supported version {supported}")]
    DbTooNew { found: i64, supported: i64 },
    #[error("stored profile list for job {0} is invalid")]
    InvalidProfile(JobId),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("job {0} already exists")]
    JobAlreadyExists(JobId),
    #[error("receipt for job {job_id} seq {seq} already exists")]
    DuplicateReceipt { job_id: JobId, seq: SeqNo },
    #[error("unknown claim {claim_id} for job {job_id}")]
    UnknownClaim { job_id: JobId, claim_id: ClaimId },
    #[error(
        "claim range [{start}, {end}] of job {job_id} covers {available} unclaimed receipts, expected {expected}"
    )]
    ClaimRangeUnavailable {
        job_id: JobId,
        start: SeqNo,
        end: SeqNo,
        expected: u64,
        available: u64,
    },
}

impl StoreError {
    pub fn is_duplicate_receipt(&self) -> bool {
        matches!(self, Self::DuplicateReceipt { .. })
    }
}
