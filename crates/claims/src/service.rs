#![forbid(unsafe_code)]

use crate::config::ClaimsConfig;
use crate::{
    BlobStore, ClaimError, ClaimManagerRegistry, ClaimScheduler, LedgerClient, RecoveryHandle,
    RecoveryReport, SharedStore, recover_claims,
};
use std::sync::Arc;
use tc_storage::SqliteStore;
use tracing::info;

/// Store, registry, recovery and scheduler wired together from one
/// [`ClaimsConfig`].
///
/// Recovery of the previous process's claims starts before the scheduler, and
/// both share the store handle, so they never claim the same range twice.
pub struct ClaimService {
    registry: Arc<ClaimManagerRegistry>,
    recovery: Option<RecoveryHandle>,
    scheduler: ClaimScheduler,
}

impl ClaimService {
    pub fn start(
        config: &ClaimsConfig,
        ledger: Arc<dyn LedgerClient>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, ClaimError> {
        let store = SharedStore::new(SqliteStore::open(&config.storage_dir)?);
        let registry = Arc::new(ClaimManagerRegistry::new(
            Arc::clone(&ledger),
            Arc::clone(&blobs),
            store.clone(),
            config.claim_window_blocks,
        ));
        let recovery = recover_claims(ledger, blobs, store, config.claim_window_blocks)?;
        let scheduler = ClaimScheduler::spawn(Arc::clone(&registry), config.claim_interval)?;
        info!(
            storage_dir = %config.storage_dir.display(),
            claim_window_blocks = config.claim_window_blocks,
            claim_interval_secs = config.claim_interval.as_secs(),
            recovering = recovery.jobs().len(),
            "claim service started"
        );
        Ok(Self {
            registry,
            recovery: Some(recovery),
            scheduler,
        })
    }

    pub fn registry(&self) -> &Arc<ClaimManagerRegistry> {
        &self.registry
    }

    /// Blocks until startup recovery is done. `None` once it was collected.
    pub fn wait_for_recovery(&mut self) -> Option<RecoveryReport> {
        self.recovery.take().map(RecoveryHandle::wait)
    }

    /// Stops the scheduler after its running cycle.
    pub fn stop(self) {
        self.scheduler.stop();
    }
}
