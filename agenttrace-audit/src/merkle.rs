use agenttrace_core::domain::ids::Digest32;

use crate::model::{Direction, MerkleProof};

/// Binary Merkle tree over event hashes, leaves ordered `(timestamp,
/// event_id)` ascending by the caller before `build` is invoked (spec.md
/// §4.3 "Merkle tree"). Odd levels duplicate the last node (standard rule).
pub struct MerkleTree {
    levels: Vec<Vec<Digest32>>,
}

impl MerkleTree {
    pub fn build(leaves: Vec<Digest32>) -> Self {
        if leaves.is_empty() {
            return Self { levels: vec![vec![]] };
        }
        let mut levels = vec![leaves];
        while levels.last().unwrap().len() > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut i = 0;
            while i < current.len() {
                let left = current[i];
                let right = if i + 1 < current.len() { current[i + 1] } else { current[i] };
                next.push(Digest32::of_concat(&[&left.0, &right.0]));
                i += 2;
            }
            levels.push(next);
        }
        Self { levels }
    }

    pub fn root(&self) -> Digest32 {
        self.levels.last().and_then(|l| l.first().copied()).unwrap_or(Digest32::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Builds the inclusion proof for the leaf at `index` (spec.md §4.3
    /// "Proof for leaf i").
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaves = self.levels.first()?;
        let event_hash = *leaves.get(index)?;

        let mut siblings = Vec::new();
        let mut directions = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let is_right = idx % 2 == 1;
            let sibling_idx = if is_right { idx - 1 } else { (idx + 1).min(level.len() - 1) };
            siblings.push(level[sibling_idx]);
            directions.push(if is_right { Direction::Left } else { Direction::Right });
            idx /= 2;
        }

        Some(MerkleProof {
            event_hash,
            sibling_hashes: siblings,
            directions,
            root_hash: self.root(),
        })
    }
}

/// Recomputes the root from `event_hash` and the proof's siblings/directions
/// and checks it against `root` (spec.md §4.3 "Verification").
pub fn verify_proof(proof: &MerkleProof, root: Digest32) -> bool {
    if proof.sibling_hashes.len() != proof.directions.len() {
        return false;
    }
    let mut acc = proof.event_hash;
    for (sibling, direction) in proof.sibling_hashes.iter().zip(&proof.directions) {
        acc = match direction {
            // `Direction::Left` means the sibling sits to our left.
            Direction::Left => Digest32::of_concat(&[&sibling.0, &acc.0]),
            Direction::Right => Digest32::of_concat(&[&acc.0, &sibling.0]),
        };
    }
    acc == root && proof.root_hash == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Digest32> {
        (0..n).map(|i| Digest32::of(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn single_leaf_root_equals_leaf_hash() {
        let tree = MerkleTree::build(leaves(1));
        assert_eq!(tree.root(), tree.proof(0).unwrap().event_hash);
        let proof = tree.proof(0).unwrap();
        assert!(proof.sibling_hashes.is_empty());
        assert!(verify_proof(&proof, tree.root()));
    }

    #[test]
    fn odd_leaf_counts_exercise_duplication_rule() {
        for n in [3usize, 5] {
            let tree = MerkleTree::build(leaves(n));
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert!(verify_proof(&proof, tree.root()), "proof for leaf {i} of {n} failed");
            }
        }
    }

    #[test]
    fn tampered_sibling_fails_verification() {
        let tree = MerkleTree::build(leaves(4));
        let mut proof = tree.proof(1).unwrap();
        let mut flipped = proof.sibling_hashes[0].0;
        flipped[0] ^= 0x01;
        proof.sibling_hashes[0] = Digest32(flipped);
        assert!(!verify_proof(&proof, tree.root()));
    }

    #[test]
    fn zeroed_root_fails_verification() {
        let tree = MerkleTree::build(leaves(3));
        let proof = tree.proof(1).unwrap();
        assert!(!verify_proof(&proof, Digest32::ZERO));
    }
}
