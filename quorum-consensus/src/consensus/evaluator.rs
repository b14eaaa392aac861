use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use quorum_common::{
    error::{ConsensusError, Result},
    Block, ConsensusPhase, QuorumCertificate,
};

use super::registry::VoteRegistry;
use crate::config::{bft_quorum, ClusterConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    pub quorum_size: usize,
    pub node_count: usize,
}

impl QuorumPolicy {
    /// BFT quorum: `floor(2n/3) + 1`.
    pub fn bft(node_count: usize) -> Self {
        Self {
            quorum_size: bft_quorum(node_count),
            node_count,
        }
    }

    pub fn from_config(config: &ClusterConfig) -> Self {
        Self {
            quorum_size: config.quorum_size(),
            node_count: config.node_count,
        }
    }
}

/// Turns the votes of one phase into a quorum certificate, or a phase failure.
#[derive(Debug, Clone)]
pub struct ConsensusEvaluator {
    pub policy: QuorumPolicy,
}

impl ConsensusEvaluator {
    pub fn new(policy: QuorumPolicy) -> Self {
        Self { policy }
    }

    pub fn quorum_size(&self) -> usize {
        self.policy.quorum_size
    }

    pub fn evaluate(
        &self,
        registry: &VoteRegistry,
        block: &Block,
        phase: ConsensusPhase,
        view: u64,
    ) -> Result<QuorumCertificate> {
        let required = self.policy.quorum_size;
        let votes: Vec<_> = registry
            .get_votes(block.hash(), phase)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

        if votes.len() < required {
            debug!(
                "🗳️ Block [{}] phase {}: {}/{} votes ❌ no quorum",
                block.short_hash(),
                phase,
                votes.len(),
                required
            );
            return Err(ConsensusError::PhaseQuorumFailure {
                phase,
                votes: votes.len(),
                required,
            });
        }

        info!(
            "🗳️ Block [{}] phase {}: {}/{} votes ✅ quorum",
            block.short_hash(),
            phase,
            votes.len(),
            required
        );
        QuorumCertificate::form(block, phase, view, votes, required)
    }
}
