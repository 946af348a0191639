#![forbid(unsafe_code)]

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};
use support::*;
use tc_claims::config::ClaimsConfig;
use tc_claims::stubs::{MemoryBlobStore, StubLedger};
use tc_claims::{ClaimManager, ClaimService, shared_store};
use tc_core::JobId;
use tc_storage::SqliteStore;

#[test]
fn service_recovers_then_claims_on_schedule() {
    let storage_dir = temp_dir("service_recovers_then_claims_on_schedule");
    let ledger = Arc::new(StubLedger::new());
    let blobs = Arc::new(MemoryBlobStore::new());

    // A previous process recorded segments of job 5 and never claimed them.
    {
        let store = shared_store(SqliteStore::open(&storage_dir).unwrap());
        store.lock().unwrap().insert_job(&job(5, 100)).unwrap();
        let previous = ClaimManager::new(job(5, 100), ledger.clone(), blobs.clone(), store);
        for seq in [0, 1, 4] {
            previous.add_receipt(segment(seq)).unwrap();
        }
    }

    let config = ClaimsConfig {
        storage_dir: storage_dir.clone(),
        claim_interval: Duration::from_millis(10),
        ..ClaimsConfig::default()
    };
    let mut service = ClaimService::start(&config, ledger.clone(), blobs.clone()).unwrap();
    let recovered = service.wait_for_recovery().unwrap();
    assert!(recovered.is_clean());
    assert_eq!(recovered.claims_submitted(), 2);
    assert!(service.wait_for_recovery().is_none());

    let manager = service.registry().get_or_create(job(7, 100)).unwrap();
    manager.add_receipt(segment(0)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.has_unclaimed().unwrap() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    service.stop();

    assert!(!manager.has_unclaimed().unwrap());
    let claimed: Vec<JobId> = ledger.claims().iter().map(|claim| claim.job_id).collect();
    assert_eq!(
        claimed,
        vec![JobId::new(5), JobId::new(5), JobId::new(7)]
    );
    let _ = std::fs::remove_dir_all(&storage_dir);
}
