#![forbid(unsafe_code)]

use crate::{BlobStore, ClaimError, ClaimManager, ClaimSummary, LedgerClient, SharedStore, lock_store};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use tc_core::JobId;
use tracing::{error, info, warn};

type Outcome = (JobId, Result<ClaimSummary, ClaimError>);

/// Claims left behind by a previous process.
///
/// Every job that still has unclaimed receipts gets a fresh [`ClaimManager`]
/// seeded from the store and its own worker thread. A job is skipped when it
/// has no claim yet and the persisted chain height is already past its claim
/// window. The returned handle reports one outcome per spawned job.
pub fn recover_claims(
    ledger: Arc<dyn LedgerClient>,
    blobs: Arc<dyn BlobStore>,
    store: SharedStore,
    claim_window: u64,
) -> Result<RecoveryHandle, ClaimError> {
    let (pending, current_block) = {
        let guard = lock_store(&store)?;
        (guard.unclaimed_receipts()?, guard.last_seen_block()?)
    };

    let (sender, receiver) = mpsc::channel();
    let mut jobs = Vec::new();
    let mut skipped = Vec::new();
    for (job_id, receipts) in pending {
        let lookup = lock_store(&store).and_then(|guard| {
            let job = guard.get_job(job_id)?;
            let prior_claims = guard.count_claims(job_id)?;
            Ok((job, prior_claims))
        });
        let (job, prior_claims) = match lookup {
            Ok((Some(job), prior_claims)) => (job, prior_claims),
            Ok((None, _)) => {
                error!(job_id = %job_id, "unclaimed receipts reference a missing job");
                report(&sender, job_id, Err(ClaimError::UnknownJob(job_id)));
                jobs.push(job_id);
                continue;
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "could not load job for recovery");
                report(&sender, job_id, Err(err));
                jobs.push(job_id);
                continue;
            }
        };

        if !job.may_claim(current_block, claim_window, prior_claims) {
            info!(
                job_id = %job_id,
                current_block,
                creation_block = job.creation_block(),
                segments = receipts.len(),
                "claim window elapsed before the first claim; skipping"
            );
            skipped.push(job_id);
            continue;
        }

        let manager = ClaimManager::with_receipts(
            job,
            receipts,
            Arc::clone(&ledger),
            Arc::clone(&blobs),
            store.clone(),
        )
        .with_claim_window(claim_window);
        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("tc-recover-{job_id}"))
            .spawn(move || {
                let outcome = manager.claim_verify_and_distribute_fees();
                report(&worker_sender, job_id, outcome);
            });
        if let Err(err) = spawned {
            error!(job_id = %job_id, error = %err, "could not spawn recovery worker");
            report(&sender, job_id, Err(ClaimError::Spawn(err)));
        }
        jobs.push(job_id);
    }

    info!(
        jobs = jobs.len(),
        skipped = skipped.len(),
        current_block,
        "claim recovery started"
    );
    Ok(RecoveryHandle {
        receiver,
        jobs,
        skipped,
    })
}

fn report(sender: &Sender<Outcome>, job_id: JobId, outcome: Result<ClaimSummary, ClaimError>) {
    // The handle may already be gone; the claim itself is persisted either way.
    let _ = sender.send((job_id, outcome));
}

/// Outstanding recovery work started by [`recover_claims`].
#[derive(Debug)]
pub struct RecoveryHandle {
    receiver: Receiver<Outcome>,
    jobs: Vec<JobId>,
    skipped: Vec<JobId>,
}

impl RecoveryHandle {
    /// Jobs that will report an outcome.
    pub fn jobs(&self) -> &[JobId] {
        &self.jobs
    }

    pub fn skipped(&self) -> &[JobId] {
        &self.skipped
    }

    /// Blocks until every recovering job has reported.
    pub fn wait(self) -> RecoveryReport {
        let mut outcomes = BTreeMap::new();
        // Ends once every worker has dropped its sender.
        for (job_id, outcome) in self.receiver.iter() {
            outcomes.insert(job_id, outcome);
        }
        for job_id in &self.jobs {
            if !outcomes.contains_key(job_id) {
                warn!(job_id = %job_id, "recovery worker ended without an outcome");
                outcomes.insert(*job_id, Err(ClaimError::WorkerLost(*job_id)));
            }
        }
        RecoveryReport {
            outcomes,
            skipped: self.skipped,
        }
    }
}

#[derive(Debug)]
pub struct RecoveryReport {
    pub outcomes: BTreeMap<JobId, Result<ClaimSummary, ClaimError>>,
    pub skipped: Vec<JobId>,
}

impl RecoveryReport {
    pub fn claims_submitted(&self) -> usize {
        self.outcomes
            .values()
            .filter_map(|outcome| outcome.as_ref().ok())
            .map(ClaimSummary::claim_count)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&JobId, &ClaimError)> {
        self.outcomes
            .iter()
            .filter_map(|(job_id, outcome)| outcome.as_ref().err().map(|err| (job_id, err)))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}
