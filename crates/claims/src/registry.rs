#![forbid(unsafe_code)]

use crate::{BlobStore, ClaimError, ClaimManager, LedgerClient, SharedStore, lock_store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tc_core::{Job, JobId};
use tracing::{debug, info};

/// Process-wide map from job to its claim manager.
pub struct ClaimManagerRegistry {
    ledger: Arc<dyn LedgerClient>,
    blobs: Arc<dyn BlobStore>,
    store: SharedStore,
    claim_window: u64,
    managers: Mutex<HashMap<JobId, Arc<ClaimManager>>>,
}

impl ClaimManagerRegistry {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
        store: SharedStore,
        claim_window: u64,
    ) -> Self {
        Self {
            ledger,
            blobs,
            store,
            claim_window,
            managers: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn claim_window(&self) -> u64 {
        self.claim_window
    }

    /// Returns the manager of `job`, persisting the job and loading its
    /// unclaimed receipts the first time it is seen.
    pub fn get_or_create(&self, job: Job) -> Result<Arc<ClaimManager>, ClaimError> {
        let mut managers = self.lock_managers()?;
        if let Some(manager) = managers.get(&job.id()) {
            return Ok(Arc::clone(manager));
        }

        let job_id = job.id();
        {
            let mut store = lock_store(&self.store)?;
            if store.get_job(job_id)?.is_none() {
                store.insert_job(&job)?;
                debug!(job_id = %job_id, "job persisted");
            }
        }
        let manager = Arc::new(
            ClaimManager::from_store(
                job,
                Arc::clone(&self.ledger),
                Arc::clone(&self.blobs),
                self.store.clone(),
            )?
            .with_claim_window(self.claim_window),
        );
        managers.insert(job_id, Arc::clone(&manager));
        info!(job_id = %job_id, "claim manager registered");
        Ok(manager)
    }

    pub fn get(&self, job_id: JobId) -> Result<Option<Arc<ClaimManager>>, ClaimError> {
        Ok(self.lock_managers()?.get(&job_id).cloned())
    }

    pub fn remove(&self, job_id: JobId) -> Result<Option<Arc<ClaimManager>>, ClaimError> {
        Ok(self.lock_managers()?.remove(&job_id))
    }

    /// Registered managers ordered by job id.
    pub fn managers(&self) -> Result<Vec<Arc<ClaimManager>>, ClaimError> {
        let mut out: Vec<Arc<ClaimManager>> = self.lock_managers()?.values().cloned().collect();
        out.sort_by_key(|manager| manager.job_id());
        Ok(out)
    }

    /// Drops managers whose job ended before `current_block` and that have
    /// nothing left to claim.
    pub fn prune_expired(&self, current_block: u64) -> Result<Vec<JobId>, ClaimError> {
        let mut managers = self.lock_managers()?;
        let mut pruned = Vec::new();
        for (job_id, manager) in managers.iter() {
            if manager.job().is_expired(current_block) && !manager.has_unclaimed()? {
                pruned.push(*job_id);
            }
        }
        for job_id in &pruned {
            managers.remove(job_id);
            debug!(job_id = %job_id, current_block, "expired claim manager pruned");
        }
        pruned.sort();
        Ok(pruned)
    }

    fn lock_managers(&self) -> Result<MutexGuard<'_, HashMap<JobId, Arc<ClaimManager>>>, ClaimError> {
        self.managers
            .lock()
            .map_err(|_| ClaimError::RegistryPoisoned)
    }
}
