#![forbid(unsafe_code)]

use crate::{BlobStoreError, LedgerError};
use tc_core::{JobId, SeqNo, SeqRange, TranscodedHashError};
use tc_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("expected {expected} transcoded profiles, got {actual}")]
    ProfileCountMismatch { expected: usize, actual: usize },
    #[error("profile {0} is not part of the job")]
    UnknownProfile(String),
    #[error("segment {seq} of job {job_id} already has a receipt")]
    DuplicateSegment { job_id: JobId, seq: SeqNo },
    #[error("blob store: {0}")]
    BlobStore(#[from] BlobStoreError),
    #[error("ledger rejected claim {range} of job {job_id}: {source}")]
    Ledger {
        job_id: JobId,
        range: SeqRange,
        #[source]
        source: LedgerError,
    },
    #[error("ledger: {0}")]
    LedgerQuery(#[source] LedgerError),
    #[error("storage: {0}")]
    Storage(StoreError),
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("{failed} of {attempted} claim ranges of job {job_id} failed; first: {first}")]
    PartialClaim {
        job_id: JobId,
        attempted: usize,
        failed: usize,
        first: Box<ClaimError>,
    },
    #[error("recovery worker for job {0} exited without reporting")]
    WorkerLost(JobId),
    #[error("could not spawn worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("store mutex poisoned")]
    StorePoisoned,
    #[error("claim lock of job {0} poisoned")]
    ClaimLockPoisoned(JobId),
    #[error("claim working set mutex poisoned")]
    WorkingSetPoisoned,
    #[error("claim manager registry mutex poisoned")]
    RegistryPoisoned,
}

impl ClaimError {
    /// True for errors that only say the segment was already recorded.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateSegment { .. })
    }
}

impl From<StoreError> for ClaimError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateReceipt { job_id, seq } => Self::DuplicateSegment { job_id, seq },
            StoreError::UnknownJob(job_id) => Self::UnknownJob(job_id),
            other => Self::Storage(other),
        }
    }
}

impl From<TranscodedHashError> for ClaimError {
    fn from(err: TranscodedHashError) -> Self {
        match err {
            TranscodedHashError::CountMismatch { expected, actual } => {
                Self::ProfileCountMismatch { expected, actual }
            }
            TranscodedHashError::UnknownProfile(name) => Self::UnknownProfile(name),
        }
    }
}
