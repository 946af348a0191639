#![forbid(unsafe_code)]

use tc_core::{Hash32, JobId, SeqNo, SeqRange};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertReceiptRequest {
    pub job_id: JobId,
    pub seq: SeqNo,
    pub source_ref: Option<String>,
    pub data_hash: Hash32,
    pub combined_hash: Hash32,
    pub signature: Vec<u8>,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertClaimRequest {
    pub job_id: JobId,
    pub range: SeqRange,
    pub merkle_root: Hash32,
    pub status: String,
}
