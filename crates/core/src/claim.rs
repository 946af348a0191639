#![forbid(unsafe_code)]

use crate::{ClaimId, Hash32, JobId, SeqRange};

pub const CLAIM_STATUS_SUBMITTED: &str = "submitted";
pub const CLAIM_STATUS_VERIFIED: &str = "verified";
pub const CLAIM_STATUS_VERIFICATION_FAILED: &str = "verification_failed";

/// A submitted batch: one contiguous range of a job's receipts under one root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimRecord {
    pub job_id: JobId,
    pub claim_id: ClaimId,
    pub range: SeqRange,
    pub merkle_root: Hash32,
    pub status: String,
    pub created_at_ms: i64,
}
