#![forbid(unsafe_code)]

use crate::clock;
use crate::{
    BlobStore, ClaimError, LedgerClient, SharedStore, VerificationProof, lock_store,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tc_core::{
    CLAIM_STATUS_SUBMITTED, CLAIM_STATUS_VERIFICATION_FAILED, CLAIM_STATUS_VERIFIED,
    CLAIM_WINDOW_BLOCKS, ClaimRecord, Hash32, Job, JobId, MerkleTree, Profile, SegmentReceipt,
    SeqNo, SeqRange, combined_transcoded_hash, make_ranges, selected_segments, to_hex,
};
use tc_storage::{InsertClaimRequest, InsertReceiptRequest};
use tracing::{debug, error, info, warn};

/// One transcoded segment as reported by the transcoding pipeline.
#[derive(Clone, Debug)]
pub struct AddReceiptRequest {
    pub seq: SeqNo,
    pub source_ref: Option<String>,
    pub source_data: Vec<u8>,
    pub signature: Vec<u8>,
    /// Rendered output per profile; must cover exactly the job's profiles.
    pub transcoded: HashMap<Profile, Vec<u8>>,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The claim block or the rate was not available; status stays `submitted`.
    Pending,
    Verified { selected: usize },
    Failed { selected: usize, rejected: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedClaim {
    pub claim: ClaimRecord,
    pub block_number: u64,
    pub verification: VerificationOutcome,
}

/// Claims submitted by one `claim_verify_and_distribute_fees` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    pub started_at_ms: i64,
    pub claims: Vec<SubmittedClaim>,
}

impl ClaimSummary {
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }
}

#[derive(Debug, Default)]
struct WorkingSet {
    receipts: BTreeMap<SeqNo, SegmentReceipt>,
    unclaimed: BTreeSet<SeqNo>,
}

impl WorkingSet {
    fn from_receipts(receipts: impl IntoIterator<Item = SegmentReceipt>) -> Self {
        let mut set = Self::default();
        for receipt in receipts {
            if !receipt.is_claimed() {
                set.unclaimed.insert(receipt.seq);
            }
            set.receipts.insert(receipt.seq, receipt);
        }
        set
    }
}

/// Working set and claim submission for a single job.
///
/// Receipts may be added from many threads while a claim is in flight. A
/// claim works on a snapshot of the unclaimed set, so segments added during
/// submission wait for the next call.
pub struct ClaimManager {
    job: Job,
    claim_window: u64,
    ledger: Arc<dyn LedgerClient>,
    blobs: Arc<dyn BlobStore>,
    store: SharedStore,
    working: Mutex<WorkingSet>,
}

impl ClaimManager {
    pub fn new(
        job: Job,
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
        store: SharedStore,
    ) -> Self {
        Self::with_receipts(job, Vec::new(), ledger, blobs, store)
    }

    /// A manager whose working set is seeded with already persisted receipts.
    pub fn with_receipts(
        job: Job,
        receipts: Vec<SegmentReceipt>,
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
        store: SharedStore,
    ) -> Self {
        Self {
            job,
            claim_window: CLAIM_WINDOW_BLOCKS,
            ledger,
            blobs,
            store,
            working: Mutex::new(WorkingSet::from_receipts(receipts)),
        }
    }

    /// A manager rebuilt from every unclaimed receipt the store holds for `job`.
    pub fn from_store(
        job: Job,
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
        store: SharedStore,
    ) -> Result<Self, ClaimError> {
        let receipts = lock_store(&store)?.unclaimed_receipts_for_job(job.id())?;
        Ok(Self::with_receipts(job, receipts, ledger, blobs, store))
    }

    pub fn with_claim_window(mut self, claim_window: u64) -> Self {
        self.claim_window = claim_window;
        self
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> JobId {
        self.job.id()
    }

    pub fn claim_window(&self) -> u64 {
        self.claim_window
    }

    /// Records the receipt of one transcoded segment.
    ///
    /// Nothing is kept when any step fails: a rejected receipt leaves neither a
    /// row in the store nor an entry in the working set.
    pub fn add_receipt(&self, request: AddReceiptRequest) -> Result<SegmentReceipt, ClaimError> {
        let job_id = self.job.id();
        let seq = request.seq;
        let combined_hash = combined_transcoded_hash(self.job.profiles(), &request.transcoded)?;

        let mut working = self.lock_working()?;
        if working.receipts.contains_key(&seq) {
            return Err(ClaimError::DuplicateSegment { job_id, seq });
        }
        if lock_store(&self.store)?.receipt_exists(job_id, seq)? {
            return Err(ClaimError::DuplicateSegment { job_id, seq });
        }

        let data_hash = self.blobs.put(&request.source_data)?;
        let receipt = lock_store(&self.store)?.insert_receipt(InsertReceiptRequest {
            job_id,
            seq,
            source_ref: request.source_ref,
            data_hash,
            combined_hash,
            signature: request.signature,
            window_start_ms: request.window_start_ms,
            window_end_ms: request.window_end_ms,
        })?;

        working.receipts.insert(seq, receipt.clone());
        working.unclaimed.insert(seq);
        debug!(job_id = %job_id, seq, "segment receipt recorded");
        Ok(receipt)
    }

    pub fn receipt(&self, seq: SeqNo) -> Result<Option<SegmentReceipt>, ClaimError> {
        Ok(self.lock_working()?.receipts.get(&seq).cloned())
    }

    /// Snapshot of sequence numbers not yet covered by a claim.
    pub fn unclaimed(&self) -> Result<BTreeSet<SeqNo>, ClaimError> {
        Ok(self.lock_working()?.unclaimed.clone())
    }

    pub fn has_unclaimed(&self) -> Result<bool, ClaimError> {
        Ok(!self.lock_working()?.unclaimed.is_empty())
    }

    /// Maximal contiguous runs of the current unclaimed set.
    pub fn make_ranges(&self) -> Result<Vec<SeqRange>, ClaimError> {
        Ok(make_ranges(&self.lock_working()?.unclaimed))
    }

    /// Whether a claim may still be submitted at `current_block`.
    ///
    /// Once a job has a claim, later claims are always allowed; before that
    /// the first one must land within the claim window.
    pub fn can_claim(&self, current_block: u64) -> Result<bool, ClaimError> {
        let prior_claims = lock_store(&self.store)?.count_claims(self.job.id())?;
        Ok(self
            .job
            .may_claim(current_block, self.claim_window, prior_claims))
    }

    /// Replaces the working set with the unclaimed receipts of the store.
    pub fn rebuild(&self) -> Result<(), ClaimError> {
        let mut working = self.lock_working()?;
        let receipts = lock_store(&self.store)?.unclaimed_receipts_for_job(self.job.id())?;
        *working = WorkingSet::from_receipts(receipts);
        debug!(job_id = %self.job.id(), unclaimed = working.unclaimed.len(), "working set rebuilt");
        Ok(())
    }

    /// Claims every contiguous run of unclaimed segments, then runs the
    /// verification pass for each new claim.
    ///
    /// The job's claim lock on the shared store is held for the whole call,
    /// so managers built on the same store handle never submit the same range
    /// twice. A ledger failure on one range does not stop the others; the
    /// first failure is returned once all ranges were attempted.
    ///
    /// When the ledger accepts a claim but persisting it fails, the range
    /// stays unclaimed and the next call submits it again. That case is
    /// logged at error level with the transaction hash and block number.
    pub fn claim_verify_and_distribute_fees(&self) -> Result<ClaimSummary, ClaimError> {
        let job_id = self.job.id();
        let claim_lock = self.store.claim_lock(job_id)?;
        let _claiming = claim_lock
            .lock()
            .map_err(|_| ClaimError::ClaimLockPoisoned(job_id))?;
        let started_at_ms = clock::unix_ms();

        let batches: Vec<(SeqRange, Vec<SegmentReceipt>)> = {
            let working = self.lock_working()?;
            make_ranges(&working.unclaimed)
                .into_iter()
                .map(|range| {
                    let receipts = range
                        .iter()
                        .filter_map(|seq| working.receipts.get(&seq).cloned())
                        .collect();
                    (range, receipts)
                })
                .collect()
        };
        if batches.is_empty() {
            debug!(job_id = %job_id, "nothing to claim");
            return Ok(ClaimSummary {
                started_at_ms,
                claims: Vec::new(),
            });
        }

        let attempted = batches.len();
        let mut summary = ClaimSummary {
            started_at_ms,
            claims: Vec::new(),
        };
        let mut failures = Vec::new();
        for (range, receipts) in batches {
            match self.claim_range(range, &receipts) {
                Ok(Some(claimed)) => summary.claims.push(claimed),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        job_id = %job_id,
                        range_start = range.start,
                        range_end = range.end,
                        error = %err,
                        "claim failed"
                    );
                    failures.push(err);
                }
            }
        }

        info!(
            job_id = %job_id,
            claims = summary.claims.len(),
            failed = failures.len(),
            started_at = %clock::rfc3339(started_at_ms),
            "claim pass finished"
        );
        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(summary),
            Some(first) => Err(ClaimError::PartialClaim {
                job_id,
                attempted,
                failed,
                first: Box::new(first),
            }),
        }
    }

    /// Submits and persists one range. `Ok(None)` means the working set was
    /// stale for this range and has been rebuilt instead.
    fn claim_range(
        &self,
        range: SeqRange,
        receipts: &[SegmentReceipt],
    ) -> Result<Option<SubmittedClaim>, ClaimError> {
        let job_id = self.job.id();
        let available = lock_store(&self.store)?.unclaimed_in_range(job_id, range)?;
        if available != range.segment_count() || receipts.len() as u64 != range.segment_count() {
            warn!(
                job_id = %job_id,
                range_start = range.start,
                range_end = range.end,
                available,
                "range already claimed elsewhere; rebuilding working set"
            );
            self.rebuild()?;
            return Ok(None);
        }

        let commitments: Vec<Hash32> = receipts
            .iter()
            .map(|receipt| receipt.commitment(self.job.stream_id()))
            .collect();
        let tree = MerkleTree::new(&commitments);
        let merkle_root = tree.root();

        let submission = self
            .ledger
            .submit_claim(job_id, range, &merkle_root)
            .map_err(|source| ClaimError::Ledger {
                job_id,
                range,
                source,
            })?;

        let inserted = lock_store(&self.store).and_then(|mut store| {
            Ok(store.insert_claim(InsertClaimRequest {
                job_id,
                range,
                merkle_root,
                status: CLAIM_STATUS_SUBMITTED.to_string(),
            })?)
        });
        let claim = match inserted {
            Ok(claim) => claim,
            Err(err) => {
                error!(
                    job_id = %job_id,
                    range_start = range.start,
                    range_end = range.end,
                    tx_hash = %to_hex(&submission.tx_hash),
                    block_number = submission.block_number,
                    error = %err,
                    "ledger accepted the claim but it could not be persisted"
                );
                return Err(err);
            }
        };
        {
            let mut working = self.lock_working()?;
            for seq in range.iter() {
                working.unclaimed.remove(&seq);
                if let Some(receipt) = working.receipts.get_mut(&seq) {
                    receipt.claim_id = Some(claim.claim_id);
                }
            }
        }
        info!(
            job_id = %job_id,
            claim_id = claim.claim_id,
            range_start = range.start,
            range_end = range.end,
            block_number = submission.block_number,
            merkle_root = %to_hex(&merkle_root),
            "claim submitted"
        );

        let verification = self.verify_claim(&claim, receipts, &tree, submission.block_number);
        let claim = ClaimRecord {
            status: match verification {
                VerificationOutcome::Pending => claim.status,
                VerificationOutcome::Verified { .. } => CLAIM_STATUS_VERIFIED.to_string(),
                VerificationOutcome::Failed { .. } => {
                    CLAIM_STATUS_VERIFICATION_FAILED.to_string()
                }
            },
            ..claim
        };
        Ok(Some(SubmittedClaim {
            claim,
            block_number: submission.block_number,
            verification,
        }))
    }

    /// Proves the segments selected by the claim block. Never fails: problems
    /// are logged and reflected in the returned outcome and the claim status.
    fn verify_claim(
        &self,
        claim: &ClaimRecord,
        receipts: &[SegmentReceipt],
        tree: &MerkleTree,
        block_number: u64,
    ) -> VerificationOutcome {
        let job_id = claim.job_id;
        let block_hash = match self.ledger.block_hash(block_number) {
            Ok(Some(hash)) => hash,
            Ok(None) => {
                debug!(job_id = %job_id, claim_id = claim.claim_id, block_number, "claim block not yet known");
                return VerificationOutcome::Pending;
            }
            Err(err) => {
                warn!(job_id = %job_id, claim_id = claim.claim_id, error = %err, "block hash lookup failed");
                return VerificationOutcome::Pending;
            }
        };
        let rate = match self.ledger.verification_rate() {
            Ok(rate) => rate,
            Err(err) => {
                warn!(job_id = %job_id, claim_id = claim.claim_id, error = %err, "verification rate lookup failed");
                return VerificationOutcome::Pending;
            }
        };

        let selected = selected_segments(claim.range, block_number, &block_hash, rate);
        let mut rejected = 0usize;
        for seq in &selected {
            let index = (seq - claim.range.start) as usize;
            let (Some(receipt), Some(merkle_proof)) = (receipts.get(index), tree.proof(index))
            else {
                rejected += 1;
                continue;
            };
            let proof = VerificationProof {
                job_id,
                claim_id: claim.claim_id,
                seq: *seq,
                data_hash: receipt.data_hash,
                combined_hash: receipt.combined_hash,
                signature: receipt.signature.clone(),
                leaf_index: index,
                tree_size: tree.len(),
                merkle_proof,
            };
            if let Err(err) = self.ledger.submit_verification_proof(&proof) {
                warn!(job_id = %job_id, claim_id = claim.claim_id, seq, error = %err, "verification proof rejected");
                rejected += 1;
            }
        }

        let (outcome, status) = if rejected == 0 {
            (
                VerificationOutcome::Verified {
                    selected: selected.len(),
                },
                CLAIM_STATUS_VERIFIED,
            )
        } else {
            (
                VerificationOutcome::Failed {
                    selected: selected.len(),
                    rejected,
                },
                CLAIM_STATUS_VERIFICATION_FAILED,
            )
        };
        let updated = lock_store(&self.store)
            .and_then(|mut store| Ok(store.set_claim_status(job_id, claim.claim_id, status)?));
        if let Err(err) = updated {
            warn!(job_id = %job_id, claim_id = claim.claim_id, error = %err, "claim status update failed");
        }
        info!(
            job_id = %job_id,
            claim_id = claim.claim_id,
            selected = selected.len(),
            rejected,
            status,
            "verification pass finished"
        );
        outcome
    }

    fn lock_working(&self) -> Result<MutexGuard<'_, WorkingSet>, ClaimError> {
        self.working
            .lock()
            .map_err(|_| ClaimError::WorkingSetPoisoned)
    }
}
