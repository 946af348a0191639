#![forbid(unsafe_code)]

use crate::{Hash32, SeqNo, SeqRange, be256, sha256_concat};

/// Decides whether segment `seq` of the claimed range `[start, end]` must be
/// proven on chain.
///
/// `block_hash` is the hash of the block that mined the claim, so the outcome is
/// fixed only after the claim itself is public. Selection probability is
/// `1 / rate`; a zero rate selects nothing.
pub fn should_verify_segment(
    seq: SeqNo,
    start: SeqNo,
    end: SeqNo,
    block_number: u64,
    block_hash: &Hash32,
    rate: u64,
) -> bool {
    if seq < start || seq > end || rate == 0 {
        return false;
    }
    let block = be256(block_number.wrapping_add(1));
    let digest = sha256_concat(&[
        &block,
        block_hash,
        &be256(start),
        &be256(end),
        &be256(seq),
    ]);
    reduce_be(&digest, rate) == 0
}

/// `digest` read as a big-endian unsigned integer, modulo `modulus`.
fn reduce_be(digest: &Hash32, modulus: u64) -> u64 {
    let modulus = u128::from(modulus);
    let mut acc: u128 = 0;
    for byte in digest {
        acc = ((acc << 8) | u128::from(*byte)) % modulus;
    }
    acc as u64
}

/// Every sequence number of `range` that [`should_verify_segment`] selects.
pub fn selected_segments(
    range: SeqRange,
    block_number: u64,
    block_hash: &Hash32,
    rate: u64,
) -> Vec<SeqNo> {
    range
        .iter()
        .filter(|seq| {
            should_verify_segment(*seq, range.start, range.end, block_number, block_hash, rate)
        })
        .collect()
}
