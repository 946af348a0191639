#![forbid(unsafe_code)]

//! Segment receipt bookkeeping and probabilistic claim submission for
//! transcoding jobs.
//!
//! A [`ClaimManager`] owns the working set of one job: it records receipts as
//! segments are transcoded, groups unclaimed segments into contiguous ranges,
//! commits to each range with a Merkle root and submits the claim to the
//! ledger. [`recover_claims`] rebuilds managers from the store after a restart.

pub mod config;
pub mod logging;
pub mod stubs;

mod clock;
mod collaborators;
mod error;
mod manager;
mod recovery;
mod registry;
mod scheduler;
mod service;

pub use collaborators::*;
pub use error::ClaimError;
pub use manager::*;
pub use recovery::*;
pub use registry::ClaimManagerRegistry;
pub use scheduler::*;
pub use service::ClaimService;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tc_core::JobId;
use tc_storage::SqliteStore;

/// The store handle shared by every manager of a process.
///
/// Besides the store itself it carries one claim lock per job, so that every
/// manager built on clones of the same handle claims a job's ranges one call
/// at a time.
#[derive(Clone)]
pub struct SharedStore {
    store: Arc<Mutex<SqliteStore>>,
    claim_locks: Arc<Mutex<HashMap<JobId, Arc<Mutex<()>>>>>,
}

impl SharedStore {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            claim_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, SqliteStore>, ClaimError> {
        self.store.lock().map_err(|_| ClaimError::StorePoisoned)
    }

    /// The claim lock of `job_id`. Locks nobody else holds are dropped from
    /// the map on the way.
    pub(crate) fn claim_lock(&self, job_id: JobId) -> Result<Arc<Mutex<()>>, ClaimError> {
        let mut locks = self
            .claim_locks
            .lock()
            .map_err(|_| ClaimError::ClaimLockPoisoned(job_id))?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(Arc::clone(locks.entry(job_id).or_default()))
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore").finish_non_exhaustive()
    }
}

pub fn shared_store(store: SqliteStore) -> SharedStore {
    SharedStore::new(store)
}

pub(crate) fn lock_store(store: &SharedStore) -> Result<MutexGuard<'_, SqliteStore>, ClaimError> {
    store.lock()
}
