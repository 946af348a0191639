#![forbid(unsafe_code)]

use tc_core::{ClaimId, Hash32, JobId, SeqNo, SeqRange};

/// Content-addressed storage for raw source segments.
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns their content hash, which becomes the
    /// receipt's data hash.
    fn put(&self, bytes: &[u8]) -> Result<Hash32, BlobStoreError>;
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct BlobStoreError(pub String);

/// Where a claim landed on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimSubmission {
    pub tx_hash: Hash32,
    pub block_number: u64,
}

/// One selected segment proven against the Merkle root of its claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationProof {
    pub job_id: JobId,
    pub claim_id: ClaimId,
    pub seq: SeqNo,
    pub data_hash: Hash32,
    pub combined_hash: Hash32,
    pub signature: Vec<u8>,
    pub leaf_index: usize,
    pub tree_size: usize,
    pub merkle_proof: Vec<Hash32>,
}

/// The on-chain side of claiming. Implementations must be callable from
/// several threads at once.
pub trait LedgerClient: Send + Sync {
    fn submit_claim(
        &self,
        job_id: JobId,
        range: SeqRange,
        merkle_root: &Hash32,
    ) -> Result<ClaimSubmission, LedgerError>;

    /// `None` while the block is not yet known to the node.
    fn block_hash(&self, block_number: u64) -> Result<Option<Hash32>, LedgerError>;

    /// Current `1 / rate` selection rate for verification.
    fn verification_rate(&self) -> Result<u64, LedgerError>;

    fn submit_verification_proof(&self, proof: &VerificationProof) -> Result<(), LedgerError>;

    fn current_block(&self) -> Result<u64, LedgerError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
