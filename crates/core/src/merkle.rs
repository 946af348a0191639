#![forbid(unsafe_code)]

use crate::{Hash32, sha256};

pub fn leaf_hash(commitment: &Hash32) -> Hash32 {
    let mut buf = [0u8; 33];
    buf[1..].copy_from_slice(commitment);
    sha256(&buf)
}

pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = [0u8; 65];
    buf[0] = 1;
    buf[1..33].copy_from_slice(left);
    buf[33..65].copy_from_slice(right);
    sha256(&buf)
}

fn largest_power_of_two_less_than(n: usize) -> usize {
    debug_assert!(n > 1);
    1usize << (usize::BITS - 1 - (n - 1).leading_zeros())
}

/// Merkle tree over segment commitments, in sequence order.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    leaves: Vec<Hash32>,
    root: Hash32,
}

impl MerkleTree {
    pub fn new(commitments: &[Hash32]) -> Self {
        let leaves: Vec<Hash32> = commitments.iter().map(leaf_hash).collect();
        let root = subtree_root(&leaves);
        Self { leaves, root }
    }

    pub fn root(&self) -> Hash32 {
        self.root
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Sibling hashes from the leaf up to the root.
    pub fn proof(&self, index: usize) -> Option<Vec<Hash32>> {
        (index < self.leaves.len()).then(|| subtree_proof(&self.leaves, index))
    }
}

fn subtree_root(leaves: &[Hash32]) -> Hash32 {
    match leaves.len() {
        0 => sha256(b""),
        1 => leaves[0],
        n => {
            let k = largest_power_of_two_less_than(n);
            let left = subtree_root(&leaves[..k]);
            let right = subtree_root(&leaves[k..]);
            node_hash(&left, &right)
        }
    }
}

fn subtree_proof(leaves: &[Hash32], index: usize) -> Vec<Hash32> {
    if leaves.len() <= 1 {
        return Vec::new();
    }
    let k = largest_power_of_two_less_than(leaves.len());
    if index < k {
        let mut p = subtree_proof(&leaves[..k], index);
        p.push(subtree_root(&leaves[k..]));
        p
    } else {
        let mut p = subtree_proof(&leaves[k..], index - k);
        p.push(subtree_root(&leaves[..k]));
        p
    }
}

pub fn merkle_root(commitments: &[Hash32]) -> Hash32 {
    MerkleTree::new(commitments).root()
}

/// Checks that `commitment` sits at `index` of a tree of `tree_size` leaves
/// with the given `root`.
pub fn verify_inclusion(
    commitment: &Hash32,
    index: usize,
    tree_size: usize,
    proof: &[Hash32],
    root: &Hash32,
) -> bool {
    if index >= tree_size {
        return false;
    }
    let mut fnode = index;
    let mut snode = tree_size - 1;
    let mut r = leaf_hash(commitment);
    for p in proof {
        if snode == 0 {
            return false;
        }
        if fnode & 1 == 1 || fnode == snode {
            r = node_hash(p, &r);
            while fnode & 1 == 0 && fnode != 0 {
                fnode >>= 1;
                snode >>= 1;
            }
        } else {
            r = node_hash(&r, p);
        }
        fnode >>= 1;
        snode >>= 1;
    }
    snode == 0 && r == *root
}
