use std::collections::{BTreeMap, HashMap};

use quorum_common::{
    error::{ConsensusError, Result},
    ConsensusPhase, NodeId, Vote,
};

/// Votes collected during one voting attempt, separated by phase.
///
/// A fresh registry is used for every attempt so that a retried or
/// fallen-back block never reuses state from an earlier attempt.
#[derive(Debug, Default, Clone)]
pub struct VoteRegistry {
    // BlockHash -> Phase -> NodeId -> Vote
    votes: HashMap<String, HashMap<ConsensusPhase, BTreeMap<NodeId, Vote>>>,

    // Phase -> NodeId -> BlockHash (detects a node voting for two blocks in one phase)
    votes_by_phase: HashMap<ConsensusPhase, HashMap<NodeId, String>>,
}

impl VoteRegistry {
    pub fn new() -> Self {
        Self {
            votes: HashMap::new(),
            votes_by_phase: HashMap::new(),
        }
    }

    /// Records a vote, rejecting a second vote from the same node in the same phase.
    pub fn register_vote(&mut self, vote: Vote) -> Result<()> {
        let phase_votes = self.votes_by_phase.entry(vote.phase).or_default();
        if phase_votes.contains_key(&vote.node_id) {
            return Err(ConsensusError::DuplicateVote {
                node: vote.node_id,
                phase: vote.phase,
            });
        }
        phase_votes.insert(vote.node_id, vote.block_hash.clone());

        self.votes
            .entry(vote.block_hash.clone())
            .or_default()
            .entry(vote.phase)
            .or_default()
            .insert(vote.node_id, vote);
        Ok(())
    }

    pub fn count(&self, block_hash: &str, phase: ConsensusPhase) -> usize {
        self.get_votes(block_hash, phase).map(|m| m.len()).unwrap_or(0)
    }

    /// Votes for a block across all phases of this attempt.
    pub fn total_votes(&self, block_hash: &str) -> usize {
        self.votes
            .get(block_hash)
            .map(|phases| phases.values().map(|m| m.len()).sum())
            .unwrap_or(0)
    }

    pub fn get_votes(&self, block_hash: &str, phase: ConsensusPhase) -> Option<&BTreeMap<NodeId, Vote>> {
        self.votes.get(block_hash).and_then(|p| p.get(&phase))
    }

    pub fn has_voted(&self, node: NodeId, phase: ConsensusPhase) -> bool {
        self.votes_by_phase
            .get(&phase)
            .map(|m| m.contains_key(&node))
            .unwrap_or(false)
    }
}
