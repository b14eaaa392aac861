//! Tail-fork detection.
//!
//! Runs before voting at a height. Two or more distinct candidates at the same
//! height, at least one of which already carries votes, form a tail fork. The
//! resolution is a pure function of the candidates so that every honest node
//! picks the same canonical block.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use super::pool::Candidate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkResolution {
    pub height: u64,
    pub canonical: String,
    /// Hashes removed from further voting at this height.
    pub discarded: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TailForkDetector;

impl TailForkDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn is_tail_fork(&self, candidates: &[Candidate]) -> bool {
        let mut hashes: Vec<&str> = candidates.iter().map(|c| c.hash()).collect();
        hashes.sort_unstable();
        hashes.dedup();
        hashes.len() >= 2 && candidates.iter().any(|c| c.votes > 0)
    }

    /// Picks the canonical candidate: locked first, then most votes, then lowest hash.
    pub fn choose<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates
            .iter()
            .min_by_key(|c| (Reverse(c.locked), Reverse(c.votes), c.hash()))
    }

    /// Resolves a tail fork. Returns `None` when the candidates do not form one.
    pub fn resolve(&self, height: u64, candidates: &[Candidate]) -> Option<ForkResolution> {
        if !self.is_tail_fork(candidates) {
            return None;
        }
        let canonical = self.choose(candidates)?.hash().to_string();

        let mut discarded: Vec<String> = candidates
            .iter()
            .map(|c| c.hash().to_string())
            .filter(|h| *h != canonical)
            .collect();
        discarded.sort();
        discarded.dedup();

        Some(ForkResolution {
            height,
            canonical,
            discarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quorum_common::{Block, NodeId, TransactionBatch};

    fn candidate(proposer: usize, votes: usize, locked: bool) -> Candidate {
        let block = Block::new(4, "parent", NodeId(proposer), 0, 10, TransactionBatch::default());
        Candidate {
            block,
            votes,
            locked,
        }
    }

    #[test]
    fn test_single_candidate_is_not_a_fork() {
        let detector = TailForkDetector::new();
        assert!(!detector.is_tail_fork(&[candidate(0, 5, false)]));
        assert!(detector.resolve(4, &[candidate(0, 5, false)]).is_none());
    }

    #[test]
    fn test_unvoted_candidates_are_not_a_fork() {
        let detector = TailForkDetector::new();
        let cands = [candidate(0, 0, false), candidate(1, 0, false)];
        assert!(!detector.is_tail_fork(&cands));
    }

    #[test]
    fn test_locked_candidate_wins() {
        let detector = TailForkDetector::new();
        let cands = [candidate(0, 9, false), candidate(1, 1, true)];
        let res = detector.resolve(4, &cands).unwrap();
        assert_eq!(res.canonical, cands[1].hash());
        assert_eq!(res.discarded, vec![cands[0].hash().to_string()]);
    }

    #[test]
    fn test_most_votes_then_lowest_hash() {
        let detector = TailForkDetector::new();
        let cands = [candidate(0, 2, false), candidate(1, 6, false)];
        assert_eq!(detector.resolve(4, &cands).unwrap().canonical, cands[1].hash());

        let tied = [candidate(2, 3, false), candidate(3, 3, false)];
        let lowest = tied.iter().map(|c| c.hash()).min().unwrap();
        assert_eq!(detector.resolve(4, &tied).unwrap().canonical, lowest);
    }

    proptest! {
        #[test]
        fn prop_resolution_ignores_input_order(
            votes in proptest::collection::vec(0usize..4, 2..6),
            locked_idx in proptest::option::of(0usize..6),
            rotate in 0usize..6,
        ) {
            let cands: Vec<Candidate> = votes
                .iter()
                .enumerate()
                .map(|(i, v)| candidate(i, *v, Some(i) == locked_idx))
                .collect();
            let mut shuffled = cands.clone();
            let len = shuffled.len();
            shuffled.rotate_left(rotate % len);
            shuffled.reverse();

            let detector = TailForkDetector::new();
            prop_assert_eq!(detector.resolve(4, &cands), detector.resolve(4, &shuffled));
        }
    }
}
