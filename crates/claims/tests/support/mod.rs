#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tc_claims::stubs::{MemoryBlobStore, StubLedger};
use tc_claims::{AddReceiptRequest, ClaimManager, SharedStore, shared_store};
use tc_core::{Hash32, Job, JobId, Profile, SeqNo, segment_commitment, sha256, sha256_concat};
use tc_storage::SqliteStore;

pub(crate) const STREAM_ID: &str = "strmID";

pub(crate) fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tc_claims_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub(crate) fn p240() -> Profile {
    Profile::try_new("P240p30fps16x9", "426x240", "400k", 30).expect("P240")
}

pub(crate) fn p360() -> Profile {
    Profile::try_new("P360p30fps4x3", "480x360", "1000k", 30).expect("P360")
}

pub(crate) fn p720() -> Profile {
    Profile::try_new("P720p30fps4x3", "960x720", "4000k", 30).expect("P720")
}

pub(crate) fn p144() -> Profile {
    Profile::try_new("P144p30fps16x9", "256x144", "400k", 30).expect("P144")
}

/// A job over the three standard profiles, live from `creation_block` to
/// `creation_block + 100`.
pub(crate) fn job(id: u64, creation_block: u64) -> Job {
    Job::try_new(
        JobId::new(id),
        STREAM_ID,
        vec![p240(), p360(), p720()],
        "0xbroadcaster",
        1,
        creation_block,
        creation_block + 100,
    )
    .expect("job")
}

pub(crate) fn source_data(seq: SeqNo) -> Vec<u8> {
    format!("source-{seq}").into_bytes()
}

pub(crate) fn signature(seq: SeqNo) -> Vec<u8> {
    format!("sig-{seq}").into_bytes()
}

pub(crate) fn rendition(profile: &Profile, seq: SeqNo) -> Vec<u8> {
    format!("{}-{seq}", profile.name()).into_bytes()
}

pub(crate) fn segment_with(seq: SeqNo, profiles: &[Profile]) -> AddReceiptRequest {
    let transcoded: HashMap<Profile, Vec<u8>> = profiles
        .iter()
        .map(|profile| (profile.clone(), rendition(profile, seq)))
        .collect();
    AddReceiptRequest {
        seq,
        source_ref: Some(format!("segment-{seq}.ts")),
        source_data: source_data(seq),
        signature: signature(seq),
        transcoded,
        window_start_ms: 1_000,
        window_end_ms: 2_000,
    }
}

pub(crate) fn segment(seq: SeqNo) -> AddReceiptRequest {
    segment_with(seq, &[p240(), p360(), p720()])
}

/// The commitment of `segment(seq)`, computed from first principles.
pub(crate) fn expected_commitment(seq: SeqNo) -> Hash32 {
    let combined = sha256_concat(&[
        &sha256(&rendition(&p720(), seq)),
        &sha256(&rendition(&p360(), seq)),
        &sha256(&rendition(&p240(), seq)),
    ]);
    segment_commitment(
        STREAM_ID,
        seq,
        &sha256(&source_data(seq)),
        &combined,
        &signature(seq),
    )
}

pub(crate) struct Harness {
    pub(crate) ledger: Arc<StubLedger>,
    pub(crate) blobs: Arc<MemoryBlobStore>,
    pub(crate) store: SharedStore,
    pub(crate) storage_dir: PathBuf,
}

impl Harness {
    pub(crate) fn open(test_name: &str) -> Self {
        let storage_dir = temp_dir(test_name);
        let store = SqliteStore::open(&storage_dir).expect("open store");
        Self {
            ledger: Arc::new(StubLedger::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            store: shared_store(store),
            storage_dir,
        }
    }

    /// Persists `job` and returns an empty manager for it.
    pub(crate) fn manager(&self, job: Job) -> ClaimManager {
        self.store
            .lock()
            .expect("store lock")
            .insert_job(&job)
            .expect("insert job");
        ClaimManager::new(
            job,
            self.ledger.clone(),
            self.blobs.clone(),
            self.store.clone(),
        )
    }

    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&mut SqliteStore) -> T) -> T {
        let mut store = self.store.lock().expect("store lock");
        f(&mut store)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.storage_dir);
    }
}
