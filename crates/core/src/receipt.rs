#![forbid(unsafe_code)]

use crate::{ClaimId, Hash32, JobId, Profile, SeqNo, be256, sha256, sha256_concat};
use std::collections::HashMap;

/// Durable commitment to one transcoded segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentReceipt {
    pub job_id: JobId,
    pub seq: SeqNo,
    pub source_ref: Option<String>,
    pub data_hash: Hash32,
    pub combined_hash: Hash32,
    pub signature: Vec<u8>,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub claim_id: Option<ClaimId>,
}

impl SegmentReceipt {
    pub fn is_claimed(&self) -> bool {
        self.claim_id.is_some()
    }

    pub fn commitment(&self, stream_id: &str) -> Hash32 {
        segment_commitment(
            stream_id,
            self.seq,
            &self.data_hash,
            &self.combined_hash,
            &self.signature,
        )
    }
}

/// Leaf value of a claim's Merkle tree: binds the stream, the sequence number,
/// the source and output hashes and the broadcaster signature.
pub fn segment_commitment(
    stream_id: &str,
    seq: SeqNo,
    data_hash: &Hash32,
    combined_hash: &Hash32,
    signature: &[u8],
) -> Hash32 {
    let seq = be256(seq);
    sha256_concat(&[
        stream_id.as_bytes(),
        &seq,
        data_hash,
        combined_hash,
        signature,
    ])
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TranscodedHashError {
    #[error("expected {expected} transcoded outputs, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("profile {0} is not configured for this job")]
    UnknownProfile(String),
}

/// `sha256(sha256(p1) || sha256(p2) || ...)` over `order`.
///
/// Every key of `payloads` must appear in `order` and the sizes must match, so
/// the map's iteration order never leaks into the result.
pub fn combined_transcoded_hash(
    order: &[Profile],
    payloads: &HashMap<Profile, Vec<u8>>,
) -> Result<Hash32, TranscodedHashError> {
    if payloads.len() != order.len() {
        return Err(TranscodedHashError::CountMismatch {
            expected: order.len(),
            actual: payloads.len(),
        });
    }
    if let Some(unknown) = payloads.keys().find(|p| !order.contains(p)) {
        return Err(TranscodedHashError::UnknownProfile(unknown.name().to_string()));
    }

    let mut concat = Vec::with_capacity(order.len() * 32);
    for profile in order {
        let Some(payload) = payloads.get(profile) else {
            return Err(TranscodedHashError::UnknownProfile(profile.name().to_string()));
        };
        concat.extend_from_slice(&sha256(payload));
    }
    Ok(sha256(&concat))
}
