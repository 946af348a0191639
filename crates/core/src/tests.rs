use super::*;
use std::collections::{BTreeSet, HashMap};

fn p240() -> Profile {
    Profile::try_new("P240p30fps16x9", "426x240", "400k", 30).unwrap()
}

fn p360() -> Profile {
    Profile::try_new("P360p30fps4x3", "480x360", "1000k", 30).unwrap()
}

fn p720() -> Profile {
    Profile::try_new("P720p30fps4x3", "960x720", "4000k", 30).unwrap()
}

fn stub_job() -> Job {
    Job::try_new(
        JobId::new(5),
        "strmID",
        vec![p240(), p360(), p720()],
        "0xbroadcaster",
        1,
        100,
        200,
    )
    .unwrap()
}

#[test]
fn profile_validation() {
    assert_eq!(
        Profile::try_new("", "1x1", "1k", 30).unwrap_err(),
        ProfileError::EmptyName
    );
    assert_eq!(
        Profile::try_new("P", "720p", "1k", 30).unwrap_err(),
        ProfileError::InvalidResolution
    );
    assert_eq!(
        Profile::try_new("P", "0x720", "1k", 30).unwrap_err(),
        ProfileError::InvalidResolution
    );
    assert_eq!(
        Profile::try_new("P", "1280x720", "1k", 0).unwrap_err(),
        ProfileError::ZeroFramerate
    );
}

#[test]
fn job_profiles_are_deduplicated_and_ordered_by_name_descending() {
    let job = Job::try_new(
        JobId::new(1),
        "s",
        vec![p240(), p360(), p240(), p720()],
        "b",
        0,
        0,
        10,
    )
    .unwrap();
    let names: Vec<&str> = job.profiles().iter().map(Profile::name).collect();
    assert_eq!(names, vec!["P720p30fps4x3", "P360p30fps4x3", "P240p30fps16x9"]);
}

#[test]
fn conflicting_profile_definitions_are_rejected() {
    let other = Profile::try_new("P240p30fps16x9", "426x240", "600k", 30).unwrap();
    assert_eq!(
        canonical_profiles(vec![p240(), other]).unwrap_err(),
        ProfileError::ConflictingName("P240p30fps16x9".to_string())
    );
    assert_eq!(canonical_profiles(Vec::new()).unwrap_err(), ProfileError::EmptyList);
}

#[test]
fn job_rejects_inverted_block_range() {
    let err = Job::try_new(JobId::new(1), "s", vec![p240()], "b", 0, 10, 9).unwrap_err();
    assert_eq!(
        err,
        JobError::EndBeforeCreation {
            creation_block: 10,
            end_block: 9
        }
    );
}

#[test]
fn claim_window_allows_late_claims_only_after_a_first_claim() {
    let job = stub_job();
    assert!(!job.claim_window_elapsed(356, CLAIM_WINDOW_BLOCKS));
    assert!(job.claim_window_elapsed(357, CLAIM_WINDOW_BLOCKS));
    assert!(job.may_claim(356, CLAIM_WINDOW_BLOCKS, 0));
    assert!(!job.may_claim(1000, CLAIM_WINDOW_BLOCKS, 0));
    assert!(job.may_claim(1000, CLAIM_WINDOW_BLOCKS, 1));
    assert!(job.is_expired(201));
    assert!(!job.is_expired(200));
}

#[test]
fn combined_hash_follows_canonical_order_not_map_order() {
    let job = stub_job();
    let mut payloads = HashMap::new();
    payloads.insert(p240(), b"out-240".to_vec());
    payloads.insert(p720(), b"out-720".to_vec());
    payloads.insert(p360(), b"out-360".to_vec());

    let mut concat = Vec::new();
    concat.extend_from_slice(&sha256(b"out-720"));
    concat.extend_from_slice(&sha256(b"out-360"));
    concat.extend_from_slice(&sha256(b"out-240"));
    let expected = sha256(&concat);

    assert_eq!(
        combined_transcoded_hash(job.profiles(), &payloads).unwrap(),
        expected
    );

    let mut reinserted = HashMap::new();
    for profile in [p360(), p240(), p720()] {
        let payload = payloads[&profile].clone();
        reinserted.insert(profile, payload);
    }
    assert_eq!(
        combined_transcoded_hash(job.profiles(), &reinserted).unwrap(),
        expected
    );
}

#[test]
fn combined_hash_rejects_wrong_profile_sets() {
    let job = stub_job();
    let mut payloads = HashMap::new();
    payloads.insert(p240(), b"x".to_vec());
    payloads.insert(p360(), b"x".to_vec());
    assert_eq!(
        combined_transcoded_hash(job.profiles(), &payloads).unwrap_err(),
        TranscodedHashError::CountMismatch {
            expected: 3,
            actual: 2
        }
    );

    let p144 = Profile::try_new("P144p30fps16x9", "256x144", "400k", 30).unwrap();
    payloads.insert(p144, b"x".to_vec());
    assert_eq!(
        combined_transcoded_hash(job.profiles(), &payloads).unwrap_err(),
        TranscodedHashError::UnknownProfile("P144p30fps16x9".to_string())
    );
}

#[test]
fn commitment_binds_every_field() {
    let base = segment_commitment("s", 7, &[1u8; 32], &[2u8; 32], b"sig");
    assert_ne!(base, segment_commitment("t", 7, &[1u8; 32], &[2u8; 32], b"sig"));
    assert_ne!(base, segment_commitment("s", 8, &[1u8; 32], &[2u8; 32], b"sig"));
    assert_ne!(base, segment_commitment("s", 7, &[3u8; 32], &[2u8; 32], b"sig"));
    assert_ne!(base, segment_commitment("s", 7, &[1u8; 32], &[3u8; 32], b"sig"));
    assert_ne!(base, segment_commitment("s", 7, &[1u8; 32], &[2u8; 32], b"sih"));
}

#[test]
fn ranges_split_on_gaps() {
    let mut unclaimed = BTreeSet::new();
    for (start, end) in [(0, 0), (3, 13), (15, 18), (21, 25), (27, 27), (29, 29)] {
        unclaimed.extend(start..=end);
    }
    let ranges = make_ranges(&unclaimed);
    assert_eq!(ranges.len(), 6);
    assert_eq!(ranges[1], SeqRange { start: 3, end: 13 });
    assert_eq!(ranges[5], SeqRange { start: 29, end: 29 });

    assert!(make_ranges(&BTreeSet::new()).is_empty());
}

#[test]
fn ranges_partition_the_unclaimed_set() {
    // Deterministic LCG so failures are reproducible.
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    for _ in 0..50 {
        let mut unclaimed = BTreeSet::new();
        for _ in 0..64 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            unclaimed.insert((state >> 33) % 128);
        }

        let ranges = make_ranges(&unclaimed);
        let mut covered = BTreeSet::new();
        for window in ranges.windows(2) {
            // maximal: a gap of at least one sequence number between runs
            assert!(window[0].end + 1 < window[1].start);
        }
        for range in &ranges {
            assert!(range.start <= range.end);
            covered.extend(range.iter());
        }
        assert_eq!(covered, unclaimed);
    }
}

#[test]
fn ranges_handle_the_top_of_the_sequence_space() {
    let unclaimed: BTreeSet<u64> = [u64::MAX - 1, u64::MAX].into_iter().collect();
    assert_eq!(
        make_ranges(&unclaimed),
        vec![SeqRange {
            start: u64::MAX - 1,
            end: u64::MAX
        }]
    );
}

#[test]
fn segment_count_never_overflows() {
    let full = SeqRange {
        start: 0,
        end: u64::MAX,
    };
    assert_eq!(full.segment_count(), u64::MAX);
    let inverted = SeqRange { start: 9, end: 3 };
    assert_eq!(inverted.segment_count(), 0);
    assert_eq!(SeqRange::new(3, 9).unwrap().segment_count(), 7);
    assert_eq!(SeqRange::new(5, 5).unwrap().segment_count(), 1);
}

#[test]
fn merkle_proofs_verify_against_root() {
    for size in 1..=17usize {
        let commitments: Vec<Hash32> = (0..size).map(|i| sha256(&i.to_be_bytes())).collect();
        let tree = MerkleTree::new(&commitments);
        assert_eq!(tree.len(), size);
        for (index, commitment) in commitments.iter().enumerate() {
            let proof = tree.proof(index).unwrap();
            assert!(verify_inclusion(commitment, index, size, &proof, &tree.root()));
            if size > 1 {
                let other = (index + 1) % size;
                assert!(!verify_inclusion(commitment, other, size, &proof, &tree.root()));
            }
        }
        assert!(tree.proof(size).is_none());
    }
}

#[test]
fn merkle_root_of_one_commitment_is_its_leaf_hash() {
    let commitment = sha256(b"only");
    assert_eq!(merkle_root(&[commitment]), leaf_hash(&commitment));
    assert_ne!(
        merkle_root(&[commitment, commitment]),
        merkle_root(&[commitment])
    );
}

fn fixed_block_hash() -> Hash32 {
    let mut hash = [0u8; 32];
    hash[..18].copy_from_slice(&[0, 2, 4, 42, 2, 3, 4, 4, 4, 2, 21, 1, 1, 24, 134, 0, 2, 43]);
    hash
}

#[test]
fn verification_selection_varies_with_sequence_number() {
    let block_hash = fixed_block_hash();
    let outcomes: Vec<bool> = (0..10)
        .map(|seq| should_verify_segment(seq, 0, 10, 100, &block_hash, 5))
        .collect();
    assert!(
        outcomes.iter().any(|v| *v) && outcomes.iter().any(|v| !*v),
        "selection must not be constant: {outcomes:?}"
    );
}

#[test]
fn verification_selection_is_deterministic_and_bounded() {
    let block_hash = fixed_block_hash();
    for seq in 0..10 {
        assert_eq!(
            should_verify_segment(seq, 0, 10, 100, &block_hash, 5),
            should_verify_segment(seq, 0, 10, 100, &block_hash, 5)
        );
        assert!(!should_verify_segment(seq, 0, 10, 100, &block_hash, 0));
    }
    assert!(!should_verify_segment(11, 0, 10, 100, &block_hash, 1));
    assert!(should_verify_segment(10, 0, 10, 100, &block_hash, 1));
}

#[test]
fn verification_selection_rate_is_roughly_one_in_rate() {
    let block_hash = fixed_block_hash();
    let selected = (0..10_000u64)
        .filter(|seq| should_verify_segment(*seq, 0, 9_999, 100, &block_hash, 10))
        .count();
    assert!((800..=1200).contains(&selected), "selected {selected}");
}

#[test]
fn job_id_parse() {
    assert_eq!(JobId::parse(" 42 ").unwrap(), JobId::new(42));
    assert_eq!(JobId::parse("").unwrap_err(), JobIdError::Empty);
    assert_eq!(JobId::parse("-1").unwrap_err(), JobIdError::NotDecimal);
    assert_eq!(
        JobId::parse("18446744073709551616").unwrap_err(),
        JobIdError::TooLarge
    );
}

#[test]
fn profiles_round_trip_through_json() {
    let job = stub_job();
    let encoded = serde_json::to_string(job.profiles()).unwrap();
    let decoded: Vec<Profile> = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, job.profiles());
}

#[test]
fn selected_segments_agree_with_the_selector() {
    let block_hash = fixed_block_hash();
    let range = SeqRange::new(0, 10).unwrap();
    let selected = selected_segments(range, 100, &block_hash, 5);
    for seq in range.iter() {
        assert_eq!(
            selected.contains(&seq),
            should_verify_segment(seq, 0, 10, 100, &block_hash, 5)
        );
    }
    assert_eq!(selected_segments(range, 100, &block_hash, 1).len(), 11);
}
