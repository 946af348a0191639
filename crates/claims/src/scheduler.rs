#![forbid(unsafe_code)]

use crate::{ClaimError, ClaimManagerRegistry, lock_store};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tc_core::JobId;
use tracing::{debug, error, info, warn};

/// What one pass over the registry did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimCycleReport {
    pub current_block: u64,
    pub claims_submitted: usize,
    /// Managers with nothing to claim or whose claim window has closed.
    pub skipped: Vec<JobId>,
    pub failed: Vec<JobId>,
    pub pruned: Vec<JobId>,
}

/// Runs one claim pass: records the ledger height, claims every eligible job
/// in parallel and prunes expired managers.
pub fn run_claim_cycle(registry: &ClaimManagerRegistry) -> Result<ClaimCycleReport, ClaimError> {
    let current_block = registry
        .ledger()
        .current_block()
        .map_err(ClaimError::LedgerQuery)?;
    {
        let mut store = lock_store(registry.store())?;
        if current_block > store.last_seen_block()? {
            store.set_last_seen_block(current_block)?;
        }
    }

    let mut report = ClaimCycleReport {
        current_block,
        ..ClaimCycleReport::default()
    };
    let mut eligible = Vec::new();
    for manager in registry.managers()? {
        if manager.has_unclaimed()? && manager.can_claim(current_block)? {
            eligible.push(manager);
        } else {
            report.skipped.push(manager.job_id());
        }
    }

    let outcomes: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = eligible
            .iter()
            .map(|manager| {
                (
                    manager.job_id(),
                    scope.spawn(move || manager.claim_verify_and_distribute_fees()),
                )
            })
            .collect();
        workers
            .into_iter()
            .map(|(job_id, worker)| {
                let outcome = worker
                    .join()
                    .unwrap_or(Err(ClaimError::WorkerLost(job_id)));
                (job_id, outcome)
            })
            .collect()
    });
    for (job_id, outcome) in outcomes {
        match outcome {
            Ok(summary) => report.claims_submitted += summary.claim_count(),
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "scheduled claim failed");
                report.failed.push(job_id);
            }
        }
    }

    report.pruned = registry.prune_expired(current_block)?;
    debug!(
        current_block,
        claims = report.claims_submitted,
        failed = report.failed.len(),
        pruned = report.pruned.len(),
        "claim cycle finished"
    );
    Ok(report)
}

/// Background thread running [`run_claim_cycle`] every `interval` until it is
/// stopped or dropped.
#[derive(Debug)]
pub struct ClaimScheduler {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ClaimScheduler {
    pub fn spawn(
        registry: Arc<ClaimManagerRegistry>,
        interval: Duration,
    ) -> Result<Self, ClaimError> {
        let (stop, stopped) = mpsc::channel::<()>();
        let worker = thread::Builder::new()
            .name("tc-claim-scheduler".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "claim scheduler started");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(err) = run_claim_cycle(&registry) {
                                error!(error = %err, "claim cycle failed");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("claim scheduler stopped");
            })
            .map_err(ClaimError::Spawn)?;
        Ok(Self {
            stop: Some(stop),
            worker: Some(worker),
        })
    }

    /// Stops the loop and waits for a running cycle to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the worker.
        self.stop.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("claim scheduler thread panicked");
        }
    }
}

impl Drop for ClaimScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
