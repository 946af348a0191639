#![forbid(unsafe_code)]

//! In-memory collaborators for tests and local runs.

use crate::{
    BlobStore, BlobStoreError, ClaimSubmission, LedgerClient, LedgerError, VerificationProof,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tc_core::{Hash32, JobId, SeqNo, SeqRange, be256, sha256, sha256_concat};

/// A claim as the stub ledger received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedClaim {
    pub job_id: JobId,
    pub range: SeqRange,
    pub merkle_root: Hash32,
    pub block_number: u64,
}

#[derive(Debug)]
struct LedgerState {
    current_block: u64,
    verification_rate: u64,
    block_hashes_known: bool,
    claims: Vec<RecordedClaim>,
    proofs: Vec<VerificationProof>,
    failing_starts: BTreeSet<SeqNo>,
    reject_proofs: bool,
}

/// Ledger double that mines every claim in the next block and derives block
/// hashes from the block number.
#[derive(Debug)]
pub struct StubLedger {
    state: Mutex<LedgerState>,
}

impl Default for StubLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl StubLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                current_block: 0,
                verification_rate: 1,
                block_hashes_known: true,
                claims: Vec::new(),
                proofs: Vec::new(),
                failing_starts: BTreeSet::new(),
                reject_proofs: false,
            }),
        }
    }

    pub fn stub_block_hash(block_number: u64) -> Hash32 {
        sha256_concat(&[&b"stub-block"[..], &be256(block_number)])
    }

    pub fn set_current_block(&self, block: u64) {
        self.with_state(|state| state.current_block = block);
    }

    pub fn set_verification_rate(&self, rate: u64) {
        self.with_state(|state| state.verification_rate = rate);
    }

    /// When false, `block_hash` answers `None` as if no block were mined yet.
    pub fn set_block_hashes_known(&self, known: bool) {
        self.with_state(|state| state.block_hashes_known = known);
    }

    /// Makes every claim whose range starts at `start` fail.
    pub fn fail_claims_starting_at(&self, start: SeqNo) {
        self.with_state(|state| {
            state.failing_starts.insert(start);
        });
    }

    pub fn reject_proofs(&self, reject: bool) {
        self.with_state(|state| state.reject_proofs = reject);
    }

    pub fn claims(&self) -> Vec<RecordedClaim> {
        self.with_state(|state| state.claims.clone())
    }

    pub fn proofs(&self) -> Vec<VerificationProof> {
        self.with_state(|state| state.proofs.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> T {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }
}

impl LedgerClient for StubLedger {
    fn submit_claim(
        &self,
        job_id: JobId,
        range: SeqRange,
        merkle_root: &Hash32,
    ) -> Result<ClaimSubmission, LedgerError> {
        self.with_state(|state| {
            if state.failing_starts.contains(&range.start) {
                return Err(LedgerError::Rejected(format!("claim {range} refused")));
            }
            state.current_block += 1;
            let block_number = state.current_block;
            state.claims.push(RecordedClaim {
                job_id,
                range,
                merkle_root: *merkle_root,
                block_number,
            });
            Ok(ClaimSubmission {
                tx_hash: sha256_concat(&[merkle_root, &be256(block_number)]),
                block_number,
            })
        })
    }

    fn block_hash(&self, block_number: u64) -> Result<Option<Hash32>, LedgerError> {
        Ok(self.with_state(|state| {
            (state.block_hashes_known && block_number <= state.current_block)
                .then(|| Self::stub_block_hash(block_number))
        }))
    }

    fn verification_rate(&self) -> Result<u64, LedgerError> {
        Ok(self.with_state(|state| state.verification_rate))
    }

    fn submit_verification_proof(&self, proof: &VerificationProof) -> Result<(), LedgerError> {
        self.with_state(|state| {
            if state.reject_proofs {
                return Err(LedgerError::Rejected(format!("proof for seq {} refused", proof.seq)));
            }
            state.proofs.push(proof.clone());
            Ok(())
        })
    }

    fn current_block(&self) -> Result<u64, LedgerError> {
        Ok(self.with_state(|state| state.current_block))
    }
}

/// Blob store keeping every payload in memory, keyed by its SHA-256.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<Hash32, Vec<u8>>>,
    fail: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &Hash32) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every following `put` fail.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bytes: &[u8]) -> Result<Hash32, BlobStoreError> {
        if self.fail.lock().map(|fail| *fail).unwrap_or(true) {
            return Err(BlobStoreError("blob store unavailable".to_string()));
        }
        let hash = sha256(bytes);
        self.blobs
            .lock()
            .map_err(|_| BlobStoreError("blob map poisoned".to_string()))?
            .insert(hash, bytes.to_vec());
        Ok(hash)
    }
}
