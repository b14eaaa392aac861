use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    env::{block::Block, consensus::types::ConsensusPhase, vote_data::Vote},
    error::{ConsensusError, Result},
    utils::{time::current_time_millis, NodeId},
};

/// Aggregated proof that a quorum of distinct nodes voted for one block in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    pub block_hash: String,
    pub height: u64,
    pub view: u64,
    pub phase: ConsensusPhase,
    /// Sorted by node id.
    pub votes: Vec<Vote>,
    pub timestamp: i64,
}

impl QuorumCertificate {
    /// Forms a certificate from collected votes, rejecting it if it would not be well-formed.
    pub fn form(
        block: &Block,
        phase: ConsensusPhase,
        view: u64,
        mut votes: Vec<Vote>,
        quorum_size: usize,
    ) -> Result<Self> {
        votes.sort_by_key(|v| v.node_id);
        let qc = QuorumCertificate {
            block_hash: block.hash().to_string(),
            height: block.height(),
            view,
            phase,
            votes,
            timestamp: current_time_millis(),
        };
        qc.validate(quorum_size)?;
        Ok(qc)
    }

    /// Checks size, voter uniqueness, and that every vote targets this block and phase.
    pub fn validate(&self, quorum_size: usize) -> Result<()> {
        if self.votes.len() < quorum_size {
            return Err(ConsensusError::InvalidQuorumCertificate(format!(
                "{} votes, quorum is {}",
                self.votes.len(),
                quorum_size
            )));
        }

        let mut seen = HashSet::with_capacity(self.votes.len());
        for vote in &self.votes {
            if !seen.insert(vote.node_id) {
                return Err(ConsensusError::InvalidQuorumCertificate(format!(
                    "duplicate voter {}",
                    vote.node_id
                )));
            }
            if vote.block_hash != self.block_hash || vote.phase != self.phase {
                return Err(ConsensusError::InvalidQuorumCertificate(format!(
                    "vote from {} targets {}/{} instead of {}/{}",
                    vote.node_id, vote.block_hash, vote.phase, self.block_hash, self.phase
                )));
            }
            if !vote.verify_signature() {
                return Err(ConsensusError::InvalidQuorumCertificate(format!(
                    "bad signature from {}",
                    vote.node_id
                )));
            }
        }
        Ok(())
    }

    pub fn certifies(&self, block_hash: &str) -> bool {
        self.block_hash == block_hash
    }

    pub fn voters(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.votes.iter().map(|v| v.node_id)
    }

    pub fn has_voter(&self, node: NodeId) -> bool {
        self.votes.iter().any(|v| v.node_id == node)
    }

    /// Ordering key used to pick the highest lock: height first, then view.
    pub fn rank(&self) -> (u64, u64) {
        (self.height, self.view)
    }
}
