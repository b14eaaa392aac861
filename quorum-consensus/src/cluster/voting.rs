use std::collections::BTreeSet;

use tracing::{debug, info};

use quorum_common::{error::Result, Block, NodeId, QuorumCertificate};

use crate::{
    cluster::core::Cluster,
    consensus::{
        network::NetworkModel,
        phase::PhaseOutcome,
        speculative::{SpeculationCheck, SpeculationOutcome},
    },
    events::ConsensusEvent,
};

impl Cluster {
    /// Tallies a finished phase into the candidate pool.
    pub fn record_phase(&mut self, block: &Block, outcome: &PhaseOutcome) {
        self.pool.record_votes(block.hash(), outcome.voters.len());
        self.events.publish(ConsensusEvent::PhaseCompleted {
            height: block.height(),
            block_hash: block.hash().to_string(),
            phase: outcome.phase,
            votes: outcome.voters.len(),
            quorum_reached: outcome.reached_quorum(),
        });
    }

    /// Applies a freshly formed certificate to node state.
    ///
    /// Prepare-certifying QCs update `prepare_qc` and trigger the speculative
    /// finality check on every node. Locking QCs move the locks of the voters
    /// and of the leader.
    pub fn apply_quorum_certificate(
        &mut self,
        block: &Block,
        qc: &QuorumCertificate,
        round: u64,
        network: &dyn NetworkModel,
    ) -> Result<()> {
        let holders: BTreeSet<NodeId> = qc.voters().chain(std::iter::once(self.leader)).collect();

        if qc.phase.certifies_prepare() {
            for id in &holders {
                if let Some(node) = self.nodes.get_mut(id.index()) {
                    node.prepare_qc = Some(qc.clone());
                }
            }
        }

        if qc.phase.locks() {
            for id in &holders {
                if let Some(node) = self.nodes.get_mut(id.index()) {
                    node.lock(qc);
                }
            }
            self.pool.mark_locked(block.hash());
            debug!("🔒 {} nodes locked on {}", holders.len(), block.short_hash());
        }

        if qc.phase.certifies_prepare() && self.config.speculative_finality_enabled {
            self.try_speculate(block, qc, round, network)?;
        }
        Ok(())
    }

    fn try_speculate(
        &mut self,
        block: &Block,
        qc: &QuorumCertificate,
        round: u64,
        network: &dyn NetworkModel,
    ) -> Result<()> {
        let quorum = self.quorum_size();
        let height = block.height();
        let mut marked = 0;
        for node in &mut self.nodes {
            let check = SpeculationCheck {
                network_stable: network.is_stable(node.id, height, round),
                conflict_observed: node.conflicts_with(height, block.hash()),
            };
            if node.finality.try_mark(block, qc, quorum, check)? == SpeculationOutcome::Marked {
                marked += 1;
            }
        }

        if marked > 0 && self.speculated.insert((height, block.hash().to_string())) {
            self.metrics.record_speculative_finalization();
            info!(
                "⚡ Block {} speculatively final on {}/{} nodes",
                block.short_hash(),
                marked,
                self.nodes.len()
            );
            self.events.publish(ConsensusEvent::SpeculativeFinality {
                height,
                block_hash: block.hash().to_string(),
                nodes: marked,
            });
        }
        Ok(())
    }
}
