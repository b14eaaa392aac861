use std::{sync::Arc, time::Duration};

use tokio::{task::JoinSet, time};
use tracing::{debug, info, warn};

use quorum_common::{
    error::Result, Block, ConsensusPhase, NodeId, QuorumCertificate, Vote,
};

use super::{
    decider::{Ballot, VoteDecider},
    evaluator::{ConsensusEvaluator, QuorumPolicy},
    network::NetworkModel,
    registry::VoteRegistry,
};
use crate::metrics::Metrics;

/// Result of one voting phase.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub phase: ConsensusPhase,
    /// Nodes whose vote was delivered in time, sorted.
    pub voters: Vec<NodeId>,
    pub result: Result<QuorumCertificate>,
}

impl PhaseOutcome {
    pub fn reached_quorum(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a single phase: fans the ballot out to every node, waits for all of
/// them and evaluates the collected votes against the quorum.
pub struct PhaseExecutor {
    decider: Arc<dyn VoteDecider>,
    network: Arc<dyn NetworkModel>,
    evaluator: ConsensusEvaluator,
    phase_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl PhaseExecutor {
    pub fn new(
        decider: Arc<dyn VoteDecider>,
        network: Arc<dyn NetworkModel>,
        policy: QuorumPolicy,
        phase_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            decider,
            network,
            evaluator: ConsensusEvaluator::new(policy),
            phase_timeout,
            metrics,
        }
    }

    pub fn network(&self) -> &dyn NetworkModel {
        self.network.as_ref()
    }

    pub fn quorum_size(&self) -> usize {
        self.evaluator.quorum_size()
    }

    pub async fn run_phase(
        &self,
        nodes: &[NodeId],
        block: &Block,
        phase: ConsensusPhase,
        view: u64,
        round: u64,
        registry: &mut VoteRegistry,
    ) -> PhaseOutcome {
        let mut set = JoinSet::new();
        for &node in nodes {
            let ballot = Ballot {
                node,
                height: block.height(),
                phase,
                round,
                view,
            };
            let decider = Arc::clone(&self.decider);
            let network = Arc::clone(&self.network);
            let metrics = Arc::clone(&self.metrics);
            let block_hash = block.hash().to_string();
            let phase_timeout = self.phase_timeout;

            set.spawn(async move {
                cast_vote(ballot, block_hash, decider, network, phase_timeout, metrics).await
            });
        }

        // Barrier: every task finishes or times out before the phase is evaluated.
        let mut votes = Vec::with_capacity(nodes.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(Some(vote))) => votes.push(vote),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("⚠️ Failed to build vote: {}", e),
                Err(e) => warn!("⚠️ Vote task aborted: {}", e),
            }
        }
        votes.sort_by_key(|v: &Vote| v.node_id);

        let mut voters = Vec::with_capacity(votes.len());
        for vote in votes {
            let node = vote.node_id;
            match registry.register_vote(vote) {
                Ok(()) => voters.push(node),
                Err(e) => warn!("⚠️ Rejected vote: {}", e),
            }
        }
        self.metrics.record_phase();

        let result = self.evaluator.evaluate(registry, block, phase, view);
        info!(
            target: "consensus",
            "EVENT:VOTE_PHASE height={} block={} phase={} round={} votes={}/{} quorum={}",
            block.height(),
            block.short_hash(),
            phase,
            round,
            voters.len(),
            nodes.len(),
            result.is_ok()
        );

        PhaseOutcome {
            phase,
            voters,
            result,
        }
    }
}

/// One node's contribution to a phase. `Ok(None)` means the node did not vote,
/// either by choice or because its vote missed the phase timeout.
async fn cast_vote(
    ballot: Ballot,
    block_hash: String,
    decider: Arc<dyn VoteDecider>,
    network: Arc<dyn NetworkModel>,
    phase_timeout: Duration,
    metrics: Arc<Metrics>,
) -> Result<Option<Vote>> {
    let delay = network.vote_delay(&ballot);
    let delivery = async {
        if !delay.is_zero() {
            time::sleep(delay).await;
        }
        if !decider.should_vote(&ballot) {
            return Ok(None);
        }
        Vote::new(ballot.node, block_hash, ballot.phase).map(Some)
    };

    match time::timeout(phase_timeout, delivery).await {
        Ok(Ok(Some(vote))) => {
            metrics.record_vote();
            Ok(Some(vote))
        }
        Ok(other) => other,
        Err(_) => {
            debug!("⏱️ {} missed the {} deadline", ballot.node, ballot.phase);
            Ok(None)
        }
    }
}
